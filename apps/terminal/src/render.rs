use std::{fmt::Write as _, io::Write};

use client_core::{PendingKind, Renderer, RowNode, ViewNode};
use tracing::warn;

/// Prints each distinct frame as a plain text block.
pub struct TerminalRenderer<W> {
    out: W,
    last: Option<ViewNode>,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn render(&mut self, view: &ViewNode) {
        if self.last.as_ref() == Some(view) {
            return;
        }
        let frame = format_view(view);
        if let Err(err) = self
            .out
            .write_all(frame.as_bytes())
            .and_then(|()| self.out.flush())
        {
            warn!(%err, "failed to write frame");
            return;
        }
        self.last = Some(view.clone());
    }
}

pub fn format_view(view: &ViewNode) -> String {
    let mut frame = String::from("-- shopping list --\n");
    if view.rows.is_empty() {
        frame.push_str("  (empty)\n");
    }
    for row in &view.rows {
        format_row(&mut frame, row);
    }
    if let Some(notice) = &view.notice {
        let _ = writeln!(frame, "! {notice}");
    }
    if view.form.locked {
        frame.push_str("> adding...\n");
    } else {
        frame.push_str("> ");
    }
    frame
}

fn format_row(frame: &mut String, row: &RowNode) {
    let mark = if row.checked { 'x' } else { ' ' };
    let id = match row.key.item_id() {
        Some(id) => id.to_string(),
        None => "-".to_string(),
    };
    let _ = write!(frame, "  [{mark}] {id:<8} {}", row.label);
    match row.pending {
        Some(PendingKind::Creating) => frame.push_str("  (adding)"),
        Some(PendingKind::Updating) => frame.push_str("  (saving)"),
        Some(PendingKind::Deleting) => frame.push_str("  (deleting)"),
        None if row.locked => frame.push_str("  (busy)"),
        None if row.delete_control => frame.push_str("  [delete]"),
        None => {}
    }
    frame.push('\n');
}
