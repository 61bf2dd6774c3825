//! Receipt rendering
//!
//! Turns a [`ReceiptPayload`] into a complete ESC/POS job sized to the
//! printer's character width.

use crate::escpos::{EscPosBuilder, MAX_LINE_CHARS};
use crate::codepage::Codepage;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Company line when the payload has none
pub const DEFAULT_COMPANY: &str = "КАССА";

/// Item name when the payload has none
pub const DEFAULT_ITEM_NAME: &str = "Позиция";

/// `ESC t` table selected when nothing is configured (WPC1251)
pub const DEFAULT_CODE_TABLE: u8 = 73;

/// Print head width of an 80 mm printer
pub const DEFAULT_DOTS_PER_LINE: u32 = 576;

/// Printer built-in font
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReceiptFont {
    /// 12x24
    A,
    /// 9x17
    #[default]
    B,
}

impl ReceiptFont {
    /// Character cell width in dots
    pub fn char_width(self) -> u32 {
        match self {
            ReceiptFont::A => 12,
            ReceiptFont::B => 9,
        }
    }

    /// Default `ESC 3` line spacing
    pub fn line_spacing(self) -> u8 {
        match self {
            ReceiptFont::A => 24,
            ReceiptFont::B => 22,
        }
    }

    /// Parse a stored setting (`"A"` / `"B"`, case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "A" | "a" => Some(ReceiptFont::A),
            "B" | "b" => Some(ReceiptFont::B),
            _ => None,
        }
    }
}

/// Physical receipt printer parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLayout {
    pub dots_per_line: u32,
    pub font: ReceiptFont,
    /// Overrides the width derived from dots and font
    pub chars_per_line: Option<usize>,
    /// Overrides the font's default line spacing
    pub line_spacing: Option<u8>,
    /// `ESC t n` table; also selects the text encoder
    pub code_table: u8,
}

impl Default for ReceiptLayout {
    fn default() -> Self {
        Self {
            dots_per_line: DEFAULT_DOTS_PER_LINE,
            font: ReceiptFont::default(),
            chars_per_line: None,
            line_spacing: None,
            code_table: DEFAULT_CODE_TABLE,
        }
    }
}

impl ReceiptLayout {
    /// Characters per line, capped at [`MAX_LINE_CHARS`]
    pub fn width(&self) -> usize {
        let derived = (self.dots_per_line / self.font.char_width()) as usize;
        self.chars_per_line
            .filter(|c| *c > 0)
            .unwrap_or(derived)
            .clamp(1, MAX_LINE_CHARS)
    }

    pub fn codepage(&self) -> Codepage {
        Codepage::from_escpos_table(self.code_table)
    }

    fn builder(&self) -> EscPosBuilder {
        let mut b = EscPosBuilder::new(self.width(), self.codepage());
        b.line_spacing(self.line_spacing.unwrap_or(self.font.line_spacing()))
            .code_table(self.code_table);
        b
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReceiptItem {
    pub name: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
}

impl ReceiptItem {
    pub fn new(name: impl Into<String>, qty: Decimal, unit_price: Decimal) -> Self {
        Self {
            name: name.into(),
            qty,
            unit_price,
        }
    }

    /// Quantity as printed: never below one
    pub fn effective_qty(&self) -> Decimal {
        self.qty.max(Decimal::ONE)
    }

    pub fn line_total(&self) -> Decimal {
        round_money(self.effective_qty() * self.unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReceiptPayload {
    pub company: String,
    pub doc_number: Option<String>,
    pub created_at: Option<String>,
    pub cashier_name: Option<String>,
    pub items: Vec<ReceiptItem>,
    /// Kitchen station the order belongs to (selects the print sink)
    pub kitchen_id: Option<String>,
    pub discount: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub paid_cash: Option<Decimal>,
    pub paid_card: Option<Decimal>,
    pub change: Option<Decimal>,
    pub footer: Option<String>,
}

impl ReceiptPayload {
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(ReceiptItem::line_total).sum()
    }

    pub fn total(&self) -> Decimal {
        round_money(self.subtotal() - nonzero(self.discount).unwrap_or_default()
            + nonzero(self.tax).unwrap_or_default())
    }
}

fn nonzero(v: Option<Decimal>) -> Option<Decimal> {
    v.filter(|d| !d.is_zero())
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn round_money(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Two decimals, `.` separator
pub fn format_money(d: Decimal) -> String {
    format!("{:.2}", round_money(d))
}

fn format_qty(d: Decimal) -> String {
    d.normalize().to_string()
}

/// Renders payloads for one printer layout
pub struct ReceiptBuilder {
    layout: ReceiptLayout,
}

impl ReceiptBuilder {
    pub fn new(layout: ReceiptLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ReceiptLayout {
        &self.layout
    }

    pub fn build(&self, payload: &ReceiptPayload) -> Vec<u8> {
        let mut b = self.layout.builder();

        // header
        b.center();
        let company = payload.company.trim();
        b.line(if company.is_empty() { DEFAULT_COMPANY } else { company });
        if let Some(doc) = non_blank(&payload.doc_number) {
            b.line(&format!("ЧЕК: {}", doc));
        }
        b.left().sep_single();

        if let Some(date) = non_blank(&payload.created_at) {
            b.line(&format!("Дата: {}", date));
        }
        if let Some(cashier) = non_blank(&payload.cashier_name) {
            b.line(&format!("Кассир: {}", cashier));
        }
        b.newline();

        // items
        for item in &payload.items {
            let name = item.name.trim();
            b.line(if name.is_empty() { DEFAULT_ITEM_NAME } else { name });
            b.line(&format!(
                "{} x {} = {}",
                format_qty(item.effective_qty()),
                format_money(item.unit_price),
                format_money(item.line_total())
            ));
            b.newline();
        }
        b.sep_single();

        // adjustments
        let discount = nonzero(payload.discount);
        let tax = nonzero(payload.tax);
        if discount.is_some() || tax.is_some() {
            b.line_lr("Промежуточный итог:", &format_money(payload.subtotal()));
            if let Some(d) = discount {
                b.line_lr("Скидка:", &format!("-{}", format_money(d.abs())));
            }
            if let Some(t) = tax {
                b.line_lr("Налог:", &format_money(t));
            }
        }

        b.bold()
            .line_lr("ИТОГО:", &format_money(payload.total()))
            .bold_off();

        // payments
        let payments = [
            ("Наличными:", nonzero(payload.paid_cash)),
            ("Картой:", nonzero(payload.paid_card)),
            ("Сдача:", nonzero(payload.change)),
        ];
        if payments.iter().any(|(_, v)| v.is_some()) {
            b.sep_single();
            for (label, value) in payments {
                if let Some(v) = value {
                    b.line_lr(label, &format_money(v));
                }
            }
        }

        if let Some(footer) = non_blank(&payload.footer) {
            b.sep_single().center();
            for line in footer.lines() {
                b.line(line.trim());
            }
            b.left();
        }

        b.feed(6).cut();
        b.build()
    }
}

/// Render `payload` for a `width`-character printer with default settings
pub fn build_receipt(payload: &ReceiptPayload, width: usize) -> Vec<u8> {
    ReceiptBuilder::new(ReceiptLayout {
        chars_per_line: Some(width),
        ..ReceiptLayout::default()
    })
    .build(payload)
}

/// Code page check page: both alphabets, digits and `№`
pub fn test_page(width: usize, code_table: u8) -> Vec<u8> {
    let layout = ReceiptLayout {
        chars_per_line: Some(width),
        code_table,
        ..ReceiptLayout::default()
    };
    let mut b = layout.builder();
    b.center()
        .bold()
        .line("ТЕСТ ПЕЧАТИ")
        .bold_off()
        .left()
        .sep_single()
        .line(&format!("ESC t {} ({:?})", code_table, layout.codepage()))
        .line(&format!("Ширина: {}", layout.width()))
        .newline();

    let upper: String = ('А'..='Я').collect();
    let lower: String = ('а'..='я').collect();
    for chunk in [upper, lower, "Ёё № 0123456789".to_string()] {
        let chars: Vec<char> = chunk.chars().collect();
        for line in chars.chunks(layout.width()) {
            b.line(&line.iter().collect::<String>());
        }
    }
    b.sep_single().feed(6).cut();
    b.build()
}
