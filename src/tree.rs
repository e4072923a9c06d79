//! Containment structure of every mutant across the mutated compiler's sources.
//!
//! The description document has one entry per source file, each with a tree of AST nodes.
//! Nodes are stored in an arena and refer to each other by index; parents live in a
//! separate table so no node owns its parent.

use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::TreeError;
use crate::mutants::MutantId;

pub type NodeId = usize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationInfo {
    info_for_files: Vec<FileInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    mutation_tree_root: NodeDescription,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeDescription {
    children: Vec<NodeDescription>,
    mutation_groups: Vec<MutationGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum MutationGroup {
    ReplaceExpr(MutationInstances),
    ReplaceBinaryOperator(MutationInstances),
    ReplaceUnaryOperator(MutationInstances),
    RemoveStmt(MutationInstance),
}

#[derive(Deserialize)]
struct MutationInstances {
    instances: Vec<MutationInstance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationInstance {
    mutation_id: MutantId,
}

impl MutationGroup {
    fn mutant_ids(&self) -> Vec<MutantId> {
        match self {
            MutationGroup::ReplaceExpr(group)
            | MutationGroup::ReplaceBinaryOperator(group)
            | MutationGroup::ReplaceUnaryOperator(group) => {
                group.instances.iter().map(|i| i.mutation_id).collect()
            }
            MutationGroup::RemoveStmt(instance) => vec![instance.mutation_id],
        }
    }
}

#[derive(Debug)]
pub struct MutationTreeNode {
    pub mutant_ids: Vec<MutantId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
pub struct MutationTree {
    nodes: Vec<MutationTreeNode>,
    parents: Vec<Option<NodeId>>,
    roots: Vec<NodeId>,
    /// Indexed by mutant ID.
    owners: Vec<NodeId>,
}

impl MutationTree {
    pub fn load(path: &Path) -> Result<Self, TreeError> {
        let file = std::fs::File::open(path).map_err(|e| {
            TreeError::MalformedDescription(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_json(document: &str) -> Result<Self, TreeError> {
        Self::from_reader(document.as_bytes())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TreeError> {
        let mut deserializer = serde_json::Deserializer::from_reader(reader);
        // Trees mirror the compiler's ASTs and nest far deeper than serde_json's default limit.
        deserializer.disable_recursion_limit();
        let info = MutationInfo::deserialize(&mut deserializer)
            .map_err(|e| TreeError::MalformedDescription(e.to_string()))?;
        deserializer
            .end()
            .map_err(|e| TreeError::MalformedDescription(e.to_string()))?;
        Self::build(&info)
    }

    fn build(info: &MutationInfo) -> Result<Self, TreeError> {
        let mut tree = MutationTree {
            nodes: Vec::new(),
            parents: Vec::new(),
            roots: Vec::new(),
            owners: Vec::new(),
        };
        let mut owners: HashMap<MutantId, NodeId> = HashMap::new();
        for file in &info.info_for_files {
            let root = tree.add_node(&file.mutation_tree_root, None, &mut owners)?;
            tree.roots.push(root);
        }

        let total = owners.len();
        let mut dense = vec![0; total];
        for (id, node) in owners {
            let slot = dense.get_mut(id as usize).ok_or_else(|| {
                TreeError::MalformedDescription(format!(
                    "mutant IDs are not densely packed: found {} with only {} mutants",
                    id, total
                ))
            })?;
            *slot = node;
        }
        tree.owners = dense;
        Ok(tree)
    }

    fn add_node(
        &mut self,
        description: &NodeDescription,
        parent: Option<NodeId>,
        owners: &mut HashMap<MutantId, NodeId>,
    ) -> Result<NodeId, TreeError> {
        let node_id = self.nodes.len();
        let mutant_ids: Vec<MutantId> = description
            .mutation_groups
            .iter()
            .flat_map(MutationGroup::mutant_ids)
            .collect();
        for &id in &mutant_ids {
            if owners.insert(id, node_id).is_some() {
                return Err(TreeError::MalformedDescription(format!(
                    "mutant {} appears more than once",
                    id
                )));
            }
        }
        self.nodes.push(MutationTreeNode {
            mutant_ids,
            children: Vec::new(),
        });
        self.parents.push(parent);

        for child in &description.children {
            let child_id = self.add_node(child, Some(node_id), owners)?;
            self.nodes[node_id].children.push(child_id);
        }
        Ok(node_id)
    }

    /// Highest mutant ID + 1.
    pub fn num_mutants(&self) -> usize {
        self.owners.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// One root per source file.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, node_id: NodeId) -> Option<&MutationTreeNode> {
        self.nodes.get(node_id)
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.parents.get(node_id).copied().flatten()
    }

    pub fn owner(&self, mutant: MutantId) -> Result<NodeId, TreeError> {
        self.owners
            .get(mutant as usize)
            .copied()
            .ok_or(TreeError::OutOfRange {
                id: mutant,
                total: self.num_mutants(),
            })
    }

    /// The node's own mutants followed by its descendants', depth first.
    ///
    /// Panics if `node_id` is not a node of this tree.
    pub fn subtree_mutant_ids(&self, node_id: NodeId) -> Vec<MutantId> {
        let mut result = Vec::new();
        let mut stack = vec![node_id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            result.extend_from_slice(&node.mutant_ids);
            stack.extend(node.children.iter().rev());
        }
        result
    }

    /// Every other mutant that cannot share a batch with `mutant`: the whole subtree of its
    /// node (siblings at the same node included) and the mutants of every ancestor node.
    pub fn incompatible_mutant_ids(&self, mutant: MutantId) -> Result<BTreeSet<MutantId>, TreeError> {
        let mut node_id = self.owner(mutant)?;
        let mut result: BTreeSet<MutantId> =
            self.subtree_mutant_ids(node_id).into_iter().collect();
        while let Some(parent) = self.parent(node_id) {
            result.extend(self.nodes[parent].mutant_ids.iter().copied());
            node_id = parent;
        }
        result.remove(&mutant);
        Ok(result)
    }
}
