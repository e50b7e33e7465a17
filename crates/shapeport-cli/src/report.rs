use std::fmt::Write;

use shapeport_core::{InferenceReport, TensorSpec};

fn cell_dtype(t: &TensorSpec) -> String {
    t.dtype.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string())
}

fn cell_shape(t: &TensorSpec) -> String {
    t.shape
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "*".to_string())
}

fn cell_bytes(t: &TensorSpec) -> String {
    t.memory_usage()
        .map(|b| b.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Plain-text table of every tensor followed by byte totals.
pub fn render(report: &InferenceReport) -> String {
    let rows: Vec<[String; 5]> = report
        .tensors
        .iter()
        .map(|t| {
            [
                t.name.to_string(),
                t.role.to_string(),
                cell_dtype(t),
                cell_shape(t),
                cell_bytes(t),
            ]
        })
        .collect();
    let header = ["name", "role", "dtype", "shape", "bytes"].map(String::from);

    let mut widths = header.clone().map(|h| h.len());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    for row in std::iter::once(&header).chain(&rows) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    let _ = writeln!(
        out,
        "\n{} nodes, {} of {} tensors resolved",
        report.nodes,
        report.resolved,
        report.tensors.len()
    );
    let _ = writeln!(out, "activations: {} bytes", report.activation_bytes());
    let _ = writeln!(out, "parameters:  {} bytes", report.parameter_bytes());
    if !report.skipped_ops.is_empty() {
        let _ = writeln!(out, "skipped operators: {}", report.skipped_ops.join(", "));
    }
    for failure in &report.failures {
        let _ = writeln!(out, "failed: {failure}");
    }
    out
}
