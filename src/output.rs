use console::Style;
use crate::mutants::ExecutionStatus;
use crate::state::KillReport;

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

const KILL_KINDS: &[(ExecutionStatus, &str)] = &[
    (ExecutionStatus::CompileFailKill, "compile failure"),
    (ExecutionStatus::CompileTimeoutKill, "compile timeout"),
    (ExecutionStatus::RunFailKill, "run failure"),
    (ExecutionStatus::RunTimeoutKill, "run timeout"),
    (ExecutionStatus::MiscompilationKill, "miscompilation"),
];

pub fn print_report(report: &KillReport) {
    let pct = if report.total > 0 {
        report.killed as f64 * 100.0 / report.total as f64
    } else {
        100.0
    };

    if report.unkilled == 0 {
        print_success(&format!(
            "{} mutants, all killed using {} programs",
            report.total, report.programs
        ));
    } else {
        let style = Style::new().yellow().bold();
        println!(
            "{} {} killed / {} mutants ({:.1}%) using {} programs, round {}",
            style.apply_to("!"),
            report.killed,
            report.total,
            pct,
            report.programs,
            report.round,
        );
    }

    let dim = Style::new().dim();
    for (status, label) in KILL_KINDS {
        let count = report.count(*status);
        if count > 0 {
            println!(
                "  {} {} {} kills ({})",
                dim.apply_to("·"),
                count,
                label,
                status.strength().unwrap_or_default(),
            );
        }
    }

    if !report.reduced.is_empty() {
        println!();
        let ref_style = Style::new().cyan().bold();
        for reduced in &report.reduced {
            let ids: Vec<String> = reduced.mutants.iter().map(|m| m.to_string()).collect();
            println!(
                "  {} {}",
                ref_style.apply_to(reduced.path.display()),
                dim.apply_to(format!("kills {}", ids.join(", "))),
            );
        }
    }
}
