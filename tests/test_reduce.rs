use mutant_killer::reduce::{self, reduced_file_name, Reducer};
use mutant_killer::{KillerError, MutantId};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Every reduced program also kills the mutants in `shares_with[reduced]`.
#[derive(Default)]
struct ScriptedReducer {
    failing: BTreeSet<MutantId>,
    shares_with: Vec<(MutantId, Vec<MutantId>)>,
    current: Option<MutantId>,
    reduce_calls: Vec<MutantId>,
    kills_calls: Vec<MutantId>,
    persisted: Vec<Vec<MutantId>>,
}

impl Reducer for ScriptedReducer {
    fn reduce(&mut self, mutant: MutantId) -> Result<bool, KillerError> {
        self.reduce_calls.push(mutant);
        if self.failing.contains(&mutant) {
            return Ok(false);
        }
        self.current = Some(mutant);
        Ok(true)
    }

    fn kills(&mut self, mutant: MutantId) -> Result<bool, KillerError> {
        self.kills_calls.push(mutant);
        let current = self.current.expect("kills called before a successful reduce");
        Ok(self
            .shares_with
            .iter()
            .any(|(m, others)| *m == current && others.contains(&mutant)))
    }

    fn persist(&mut self, mutants: &[MutantId]) -> Result<PathBuf, KillerError> {
        self.persisted.push(mutants.to_vec());
        Ok(PathBuf::from("/out").join(reduced_file_name(mutants)))
    }
}

#[test]
fn empty_queue_does_nothing() {
    let mut reducer = ScriptedReducer::default();
    let reduced = reduce::reduce_miscompilations(&mut reducer, vec![]).unwrap();
    assert!(reduced.is_empty());
    assert!(reducer.reduce_calls.is_empty());
}

#[test]
fn unrelated_candidates_are_reduced_separately() {
    let mut reducer = ScriptedReducer::default();
    let reduced = reduce::reduce_miscompilations(&mut reducer, vec![3, 8]).unwrap();
    assert_eq!(reducer.reduce_calls, vec![8, 3]);
    assert_eq!(reducer.persisted, vec![vec![8], vec![3]]);
    assert_eq!(reduced.len(), 2);
    assert_eq!(reduced[0].path, PathBuf::from("/out/__kills_8.c"));
}

#[test]
fn candidates_killed_by_reduced_program_are_merged() {
    let mut reducer = ScriptedReducer {
        shares_with: vec![(9, vec![2, 5])],
        ..Default::default()
    };
    let reduced = reduce::reduce_miscompilations(&mut reducer, vec![2, 4, 5, 9]).unwrap();

    // 9 is reduced first and swallows 2 and 5; only 4 needs its own reduction.
    assert_eq!(reducer.reduce_calls, vec![9, 4]);
    assert_eq!(reducer.kills_calls, vec![2, 4, 5]);
    assert_eq!(reducer.persisted, vec![vec![2, 5, 9], vec![4]]);
    assert_eq!(reduced[0].mutants, vec![2, 5, 9]);
    assert_eq!(reduced[0].path, PathBuf::from("/out/__kills_2_5_9.c"));
    assert_eq!(reduced[1].mutants, vec![4]);
}

#[test]
fn failed_reduction_drops_only_that_candidate() {
    let mut reducer = ScriptedReducer {
        failing: [7].into_iter().collect(),
        ..Default::default()
    };
    let reduced = reduce::reduce_miscompilations(&mut reducer, vec![1, 7]).unwrap();
    assert_eq!(reducer.reduce_calls, vec![7, 1]);
    assert!(reducer.kills_calls.is_empty());
    assert_eq!(reduced.len(), 1);
    assert_eq!(reduced[0].mutants, vec![1]);
}

#[test]
fn failed_candidate_is_not_checked_against_later_reductions() {
    let mut reducer = ScriptedReducer {
        failing: [6].into_iter().collect(),
        shares_with: vec![(3, vec![6])],
        ..Default::default()
    };
    let reduced = reduce::reduce_miscompilations(&mut reducer, vec![3, 6]).unwrap();
    assert_eq!(reduced.len(), 1);
    assert_eq!(reduced[0].mutants, vec![3]);
}

#[cfg(unix)]
mod creduce {
    use mutant_killer::config::TimeoutPolicy;
    use mutant_killer::reduce::{CreduceReducer, Reducer};
    use mutant_killer::runner::{self, PROGRAM_FILE};
    use std::path::Path;
    use tempfile::TempDir;

    /// Mutant 3 changes the program's output; every other mutant leaves it alone.
    const FAKE_COMPILER: &str = r##"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case ",${DREDD_ENABLED_MUTATION:-}," in
  *,3,*) printf '#!/bin/sh\necho goodbye\n' > "$out" ;;
  *) printf '#!/bin/sh\necho hello\n' > "$out" ;;
esac
chmod +x "$out"
"##;

    /// Shrinks nothing: marks the program, records its environment and asks the test once.
    const FAKE_REDUCER: &str = r##"#!/bin/sh
echo "$CREDUCE_INCLUDE_PATH" > include_path
echo '/* reduced */' >> "$2"
"$1"
"##;

    fn write_script(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        runner::make_executable(path).unwrap();
    }

    fn reducer(dir: &TempDir) -> CreduceReducer {
        let root = dir.path();
        write_script(&root.join("bin/cc"), FAKE_COMPILER);
        write_script(&root.join("bin/reduce"), FAKE_REDUCER);
        std::fs::create_dir_all(root.join("csmith")).unwrap();
        std::fs::create_dir_all(root.join("work")).unwrap();
        std::fs::write(root.join("work").join(PROGRAM_FILE), "int main(void) { return 0; }\n")
            .unwrap();
        CreduceReducer::new(
            &root.join("bin/reduce").display().to_string(),
            &root.join("bin/cc"),
            &root.join("csmith"),
            &root.join("work"),
            &root.join("out"),
            TimeoutPolicy::default(),
        )
    }

    #[test]
    fn reduces_a_copy_and_checks_other_mutants() {
        let dir = TempDir::new().unwrap();
        let mut reducer = reducer(&dir);
        let work = dir.path().join("work");

        assert!(reducer.reduce(3).unwrap());
        assert!(reducer.kills(3).unwrap());
        assert!(!reducer.kills(4).unwrap());

        let reduced = std::fs::read_to_string(work.join("reduction").join(PROGRAM_FILE)).unwrap();
        assert!(reduced.contains("reduced"));
        let original = std::fs::read_to_string(work.join(PROGRAM_FILE)).unwrap();
        assert!(!original.contains("reduced"));

        let include_path =
            std::fs::read_to_string(work.join("reduction").join("include_path")).unwrap();
        let csmith = dir.path().join("csmith");
        assert_eq!(
            include_path.trim(),
            format!(
                "{}:{}",
                csmith.join("runtime").display(),
                csmith.join("build/runtime").display()
            )
        );
    }

    #[test]
    fn uninteresting_mutant_fails_to_reduce() {
        let dir = TempDir::new().unwrap();
        let mut reducer = reducer(&dir);
        assert!(!reducer.reduce(4).unwrap());
    }

    #[test]
    fn persist_copies_reduced_program_to_output_dir() {
        let dir = TempDir::new().unwrap();
        let mut reducer = reducer(&dir);
        assert!(reducer.reduce(3).unwrap());

        let path = reducer.persist(&[3, 11]).unwrap();
        assert_eq!(path, dir.path().join("out/__kills_3_11.c"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("reduced"));
    }
}
