//! Terminal tables for fit, tuning and bootstrap results

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::pipeline::{
    ClassificationSummary, CoefficientTable, CrossValidation, Evaluation, LinearModel,
    OptimismCorrectedAuc, Prediction, RunStatus, TuningOutcome, VifEntry,
};

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

fn print_section(icon: &str, title: &str) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn number(value: f64) -> Cell {
    Cell::new(format!("{:.4}", value)).set_alignment(CellAlignment::Right)
}

/// Highest predictions first
pub fn print_predictions(predictions: &[Prediction], top: usize, label: &str) {
    print_section("🏆", &format!("TOP {} PREDICTIONS ({})", top.min(predictions.len()), label));

    let mut table = new_table(&["Rank", "Entity", "Predicted"]);
    for (rank, prediction) in predictions.iter().take(top).enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(&prediction.entity),
            number(prediction.value).fg(Color::Cyan),
        ]);
    }
    print_indented(&table);
}

pub fn print_evaluation(evaluation: &Evaluation, rows: usize) {
    print_section("📏", "TEST-SET EVALUATION");

    let mut table = new_table(&["Metric", "Value"]);
    table.add_row(vec![Cell::new("Rows"), Cell::new(rows)]);
    table.add_row(vec![Cell::new("MSE"), number(evaluation.mse)]);
    let r2_color = if evaluation.r_squared >= 0.5 {
        Color::Green
    } else if evaluation.r_squared >= 0.0 {
        Color::Yellow
    } else {
        Color::Red
    };
    table.add_row(vec![
        Cell::new("R²"),
        number(evaluation.r_squared)
            .fg(r2_color)
            .add_attribute(Attribute::Bold),
    ]);
    print_indented(&table);
}

/// Selected penalty and the non-zero coefficients it keeps
pub fn print_lasso_fit(model: &LinearModel, cv: &CrossValidation) {
    print_section("🧮", "REGULARIZED FIT");

    let mut table = new_table(&["Setting", "Value"]);
    table.add_row(vec![Cell::new("Penalty"), Cell::new(model.penalty)]);
    table.add_row(vec![
        Cell::new("Selection"),
        Cell::new(format!("{:?}, {}-fold CV", cv.rule, cv.folds)),
    ]);
    table.add_row(vec![Cell::new("λ"), Cell::new(format!("{:.6}", model.lambda))]);
    table.add_row(vec![Cell::new("CV MSE"), number(cv.selected_mse())]);
    table.add_row(vec![
        Cell::new("Non-zero"),
        Cell::new(format!("{} / {}", model.nonzero_count(), model.coefficients.len())),
    ]);
    print_indented(&table);

    println!();
    let mut coefficients = new_table(&["Term", "Coefficient"]);
    coefficients.add_row(vec![Cell::new("(Intercept)"), number(model.intercept)]);
    for (name, value) in model.selected() {
        coefficients.add_row(vec![Cell::new(name), number(value)]);
    }
    print_indented(&coefficients);
}

/// Best runs of the search, lowest validation MSE first
pub fn print_tuning(outcome: &TuningOutcome, top: usize) {
    print_section("🔍", "HYPERPARAMETER SEARCH");

    let completed = outcome
        .runs
        .iter()
        .filter(|r| r.status == RunStatus::Completed)
        .count();
    println!(
        "      {} of {} planned run(s) finished, {} converged, seed {}{}",
        style(outcome.runs.len()).yellow().bold(),
        outcome.planned,
        completed,
        outcome.seed,
        if outcome.interrupted {
            style(" (interrupted)").red().to_string()
        } else {
            String::new()
        }
    );
    println!();

    let mut runs: Vec<_> = outcome.runs.iter().collect();
    runs.sort_by(|a, b| {
        a.validation_mse
            .partial_cmp(&b.validation_mse)
            .unwrap_or(std::cmp::Ordering::Greater)
    });

    let mut table = new_table(&["h1", "h2", "d1", "d2", "lr", "Val MSE", "Epochs"]);
    for run in runs.into_iter().take(top) {
        let best = run.index == outcome.best.index;
        let mse = number(run.validation_mse);
        table.add_row(vec![
            Cell::new(run.config.hidden_units_1),
            Cell::new(run.config.hidden_units_2),
            Cell::new(run.config.dropout_1),
            Cell::new(run.config.dropout_2),
            Cell::new(run.config.learning_rate),
            if best {
                mse.fg(Color::Green).add_attribute(Attribute::Bold)
            } else {
                mse
            },
            Cell::new(run.epochs_run),
        ]);
    }
    print_indented(&table);
}

pub fn print_coefficient_table(table: &CoefficientTable) {
    print_section("📐", &format!("BOOTSTRAP COEFFICIENTS (R = {})", table.replicates));

    let mut out = new_table(&["Term", "Estimate", "Std. Error", "z", "p", ""]);
    for row in &table.rows {
        let marker_color = if row.p_value < 0.05 { Color::Green } else { Color::White };
        out.add_row(vec![
            Cell::new(&row.name),
            number(row.estimate),
            number(row.std_error),
            number(row.z),
            Cell::new(format!("{:.4e}", row.p_value)).set_alignment(CellAlignment::Right),
            Cell::new(row.significance).fg(marker_color),
        ]);
    }
    print_indented(&out);
    println!(
        "    {}",
        style("Signif. codes: 0 '***' 0.001 '**' 0.01 '*' 0.05 '.' 0.1 ' ' 1").dim()
    );
}

pub fn print_vif(entries: &[VifEntry]) {
    print_section("🔗", "VARIANCE INFLATION FACTORS");

    let mut table = new_table(&["Predictor", "VIF"]);
    for entry in entries {
        let cell = if entry.vif.is_infinite() {
            Cell::new("∞").set_alignment(CellAlignment::Right)
        } else {
            number(entry.vif)
        };
        table.add_row(vec![
            Cell::new(&entry.column),
            if entry.flagged {
                cell.fg(Color::Red).add_attribute(Attribute::Bold)
            } else {
                cell
            },
        ]);
    }
    print_indented(&table);
}

/// Baseline and model accuracy side by side, then the AUC figures
pub fn print_classification(summary: &ClassificationSummary, auc: &OptimismCorrectedAuc) {
    print_section("🎯", "CLASSIFICATION");

    let mut table = new_table(&["Metric", "Value"]);
    table.add_row(vec![
        Cell::new(format!("Baseline accuracy (always {})", summary.majority_class)),
        number(summary.baseline_accuracy),
    ]);
    let beats = summary.model_accuracy > summary.baseline_accuracy;
    table.add_row(vec![
        Cell::new(format!("Model accuracy (p ≥ {})", summary.threshold)),
        number(summary.model_accuracy).fg(if beats { Color::Green } else { Color::Yellow }),
    ]);
    table.add_row(vec![Cell::new("Apparent AUC"), number(auc.apparent)]);
    table.add_row(vec![Cell::new("Optimism"), number(auc.optimism)]);
    table.add_row(vec![
        Cell::new("Optimism-corrected AUC"),
        number(auc.corrected)
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
    ]);
    print_indented(&table);
}
