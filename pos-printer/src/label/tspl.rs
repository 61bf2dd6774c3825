//! TSPL command text for label printers
//!
//! Streams are CRLF-separated and end with a blank line; firmware on
//! cheap label printers waits for it before flushing the job.

use super::layout::{LabelLayout, compute_layout};
use super::{LabelSpec, tspl_header, wrap_title};
use crate::codepage::Codepage;
use crate::error::PrintResult;
use tracing::debug;

/// Join commands into one job (`CRLF` between, blank line at the end)
pub(crate) fn finish(lines: &[String]) -> String {
    let mut out = lines.join("\r\n");
    out.push_str("\r\n\r\n");
    out
}

/// TSPL string literals escape `"` as `\["]`
fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\\[\"]"))
}

fn rotation(layout: &LabelLayout) -> u32 {
    if layout.rotated { 90 } else { 0 }
}

pub(crate) fn border_commands(layout: &LabelLayout) -> Vec<String> {
    layout
        .border
        .iter()
        .map(|bar| {
            let r = bar.to_physical(layout.rotated, layout.physical_width);
            format!("BAR {},{},{},{}", r.x, r.y, r.w, r.h)
        })
        .collect()
}

/// Vector label: border `BAR`s, `TEXT` lines and one EAN-13 `BARCODE`
///
/// The barcode is validated before anything is built.
pub fn build_label(spec: &LabelSpec) -> PrintResult<String> {
    let title = wrap_title(&spec.title, spec.text_scale);
    let layout = compute_layout(spec, &title)?;
    let rot = rotation(&layout);
    let scale = spec.scale();
    let phys_w = layout.physical_width;

    let mut lines = tspl_header(spec);
    lines.extend(border_commands(&layout));

    for text in layout.title.iter().chain(layout.price.iter()) {
        let (x, y) = text.anchor(layout.rotated, phys_w);
        lines.push(format!(
            "TEXT {},{},{},{},{},{},{}",
            x,
            y,
            quote(&spec.font_id),
            rot,
            scale,
            scale,
            quote(&text.text)
        ));
    }

    let bc = &layout.barcode;
    let (x, y) = bc.anchor(layout.rotated, phys_w);
    // EAN-13 has no wide bars; wide = narrow
    lines.push(format!(
        "BARCODE {},{},\"EAN13\",{},1,{},{},{},{}",
        x,
        y,
        bc.rect.h,
        rot,
        bc.narrow,
        bc.narrow,
        quote(&bc.code)
    ));
    lines.push("PRINT 1".to_string());

    debug!(
        code = %bc.code,
        title_lines = layout.title.len(),
        rotated = layout.rotated,
        "Label built"
    );
    Ok(finish(&lines))
}

/// Feed one blank label so the gap sensor learns the stock
pub fn calibration(spec: &LabelSpec) -> String {
    finish(&[
        format!("SIZE {} mm,{} mm", spec.width_mm, spec.height_mm),
        format!("GAP {} mm,0 mm", spec.gap_mm),
        "CLS".to_string(),
        "PRINT 1".to_string(),
    ])
}

/// Sent once after connecting: Cyrillic code page and gap detection
pub fn init_commands() -> String {
    finish(&[
        format!("CODEPAGE {}", Codepage::Cp866.tspl_name()),
        "SET GAP ON".to_string(),
        "SET BLINE OFF".to_string(),
    ])
}

/// Command text as printer bytes (text literals in CP866)
pub fn encode(commands: &str) -> Vec<u8> {
    Codepage::Cp866.encode(commands)
}
