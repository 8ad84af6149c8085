use crate::store::{write_atomic, write_json_atomic};
use anyhow::Result;
use limp_core::{EvaluationReport, Tally};
use std::collections::BTreeMap;
use std::path::Path;

fn pct(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn tally_table(out: &mut String, heading: &str, column: &str, rows: &BTreeMap<String, Tally>) {
    if rows.is_empty() {
        return;
    }
    out.push_str(&format!("## {heading}\n"));
    out.push_str(&format!("| {column} | correct | total | accuracy |\n|---|---|---|---|\n"));
    for (key, tally) in rows {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            key,
            tally.correct,
            tally.total,
            pct(tally.accuracy())
        ));
    }
    out.push('\n');
}

/// Render evaluation_report.md.
pub fn render_evaluation_md(report: &EvaluationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Evaluation: {}\n\n", report.config_name));
    out.push_str(&format!(
        "- episodes: {}\n- enabled agents: {}\n- questions: {}\n- accuracy: {}\n- answered accuracy: {}\n- answered: {}\n- abstained: {}\n- failed: {}\n\n",
        report.episodes.len(),
        if report.enabled_agents.is_empty() {
            "none".to_string()
        } else {
            report.enabled_agents.join(", ")
        },
        report.overall.total,
        pct(report.accuracy()),
        pct(report.answered_accuracy()),
        report.answered,
        report.abstained,
        report.failed
    ));

    tally_table(&mut out, "By Type", "type", &report.by_type);
    tally_table(&mut out, "By Level", "level", &report.by_level);
    tally_table(&mut out, "By ToM Label", "label", &report.by_tom_label);

    if !report.confusion.is_empty() {
        out.push_str("## Confusion\n");
        for (expected, row) in &report.confusion {
            let cells: Vec<String> = row.iter().map(|(p, n)| format!("{p}: {n}")).collect();
            out.push_str(&format!("- `{}` -> {}\n", expected, cells.join(", ")));
        }
        out.push('\n');
    }

    if !report.agent_contribution.is_empty() {
        out.push_str("## Agents\n");
        out.push_str("| agent | invocations | failures | mean confidence |\n|---|---|---|---|\n");
        for (agent, c) in &report.agent_contribution {
            out.push_str(&format!(
                "| {} | {} | {} | {:.2} |\n",
                agent, c.invocations, c.failures, c.mean_confidence
            ));
        }
        out.push('\n');
    }

    if !report.question_digests.is_empty() {
        out.push_str("## Question Sets\n");
        for (episode, digest) in &report.question_digests {
            out.push_str(&format!("- `{}`: `{}`\n", episode, digest));
        }
    }
    out
}

/// Render the side-by-side table for an ablation run.
pub fn render_ablation_md(reports: &[EvaluationReport]) -> String {
    let mut out = String::new();
    out.push_str("# Ablation Comparison\n\n");
    out.push_str("| config | agents | questions | accuracy | answered accuracy | abstained | failed |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for r in reports {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            r.config_name,
            r.enabled_agents.len(),
            r.overall.total,
            pct(r.accuracy()),
            pct(r.answered_accuracy()),
            r.abstained,
            r.failed
        ));
    }

    let labels: Vec<&String> = {
        let mut all: Vec<&String> = reports.iter().flat_map(|r| r.by_tom_label.keys()).collect();
        all.sort();
        all.dedup();
        all
    };
    if !labels.is_empty() {
        out.push_str("\n## Accuracy by ToM Label\n");
        out.push_str("| config |");
        for label in &labels {
            out.push_str(&format!(" {} |", label));
        }
        out.push_str("\n|---|");
        for _ in &labels {
            out.push_str("---|");
        }
        out.push('\n');
        for r in reports {
            out.push_str(&format!("| {} |", r.config_name));
            for label in &labels {
                let cell = r
                    .by_tom_label
                    .get(*label)
                    .map(|t| pct(t.accuracy()))
                    .unwrap_or_else(|| "-".to_string());
                out.push_str(&format!(" {} |", cell));
            }
            out.push('\n');
        }
    }
    out
}

pub fn write_evaluation(json_path: &Path, md_path: &Path, report: &EvaluationReport) -> Result<()> {
    write_json_atomic(json_path, report)?;
    write_atomic(md_path, render_evaluation_md(report).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, correct: usize, total: usize) -> EvaluationReport {
        let mut r = EvaluationReport {
            config_name: name.to_string(),
            episodes: vec!["ep1".to_string()],
            enabled_agents: vec!["posture".to_string(), "tom_social".to_string()],
            overall: Tally { total, correct },
            answered: total,
            ..Default::default()
        };
        r.by_tom_label
            .insert("social_goal".to_string(), Tally { total, correct });
        r
    }

    #[test]
    fn evaluation_markdown_lists_headline_numbers() {
        let md = render_evaluation_md(&report("full", 3, 4));
        assert!(md.starts_with("# Evaluation: full\n\n"));
        assert!(md.contains("- accuracy: 75.0%\n"));
        assert!(md.contains("- enabled agents: posture, tom_social\n"));
        assert!(md.contains("| social_goal | 3 | 4 | 75.0% |\n"));
        assert!(!md.contains("## Confusion"));
    }

    #[test]
    fn ablation_markdown_render_is_stable() {
        let md = render_ablation_md(&[report("full", 3, 4), report("no_tom", 1, 4)]);
        let expected = "# Ablation Comparison\n\n\
| config | agents | questions | accuracy | answered accuracy | abstained | failed |\n\
|---|---|---|---|---|---|---|\n\
| full | 2 | 4 | 75.0% | 75.0% | 0 | 0 |\n\
| no_tom | 2 | 4 | 25.0% | 25.0% | 0 | 0 |\n\
\n## Accuracy by ToM Label\n\
| config | social_goal |\n\
|---|---|\n\
| full | 75.0% |\n\
| no_tom | 25.0% |\n";
        assert_eq!(md, expected);
    }
}
