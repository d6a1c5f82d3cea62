//! Invoice document rendering.
//!
//! Produces Typst markup from an embedded template. The output is a pure
//! function of its inputs: rendering the same snapshot twice yields
//! byte-identical documents, so rendering can run before the completion is
//! committed and be retried safely. Compiling the markup to PDF is left to
//! the hosting process.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use garagekit_core::Money;
use garagekit_jobcards::PartLine;

use crate::invoice::InvoiceId;
use crate::totals::InvoiceTotals;

/// Currency symbol shown on documents. Amounts everywhere else are plain
/// minor-unit numbers; the symbol is presentation only.
pub const CURRENCY_SYMBOL: &str = "Rs.";

const INVOICE_TEMPLATE: &str = include_str!("../templates/invoice.typ.tera");
const TEMPLATE_NAME: &str = "invoice.typ";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("template rendering failed: {0}")]
    Template(#[from] tera::Error),
}

/// Human-facing invoice number: `INV-YYYYMMDD-XXXXXXXX`.
///
/// The suffix is the leading eight hex digits of the invoice id, so the
/// number is reproducible from the aggregate alone.
pub fn invoice_number(invoice_id: InvoiceId, issued_at: DateTime<Utc>) -> String {
    let hex = invoice_id.0.as_uuid().simple().to_string();
    format!(
        "INV-{}-{}",
        issued_at.format("%Y%m%d"),
        hex[..8].to_uppercase()
    )
}

/// Everything the rendered document shows, frozen at completion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDocument {
    pub garage_name: String,
    pub garage_phone: Option<String>,
    /// Path or URL of the garage logo, rendered at a fixed width so any
    /// upload lands in the same header footprint.
    pub logo: Option<String>,
    pub invoice_number: String,
    pub issued_at: DateTime<Utc>,
    pub customer_name: String,
    pub customer_phone: String,
    pub bike_number: String,
    pub description: String,
    pub lines: Vec<PartLine>,
    pub service_charge: Money,
    pub totals: InvoiceTotals,
}

#[derive(Serialize)]
struct LineContext {
    name: String,
    quantity: i64,
    unit_price: String,
    amount: String,
}

impl InvoiceDocument {
    /// File name the stored document is addressed by.
    pub fn file_name(&self) -> String {
        format!("{}.typ", self.invoice_number)
    }

    /// Render the document to Typst markup bytes.
    pub fn render(&self) -> Result<Vec<u8>, DocumentError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, INVOICE_TEMPLATE)?;

        let lines = self
            .lines
            .iter()
            .map(|line| {
                let amount = line
                    .line_total()
                    .map_err(|e| tera::Error::msg(e.to_string()))?;
                Ok(LineContext {
                    name: typst_escape(&line.name),
                    quantity: line.quantity,
                    unit_price: line.unit_price.to_string(),
                    amount: amount.to_string(),
                })
            })
            .collect::<Result<Vec<_>, tera::Error>>()?;

        let mut ctx = Context::new();
        ctx.insert("garage_name", &typst_escape(&self.garage_name));
        ctx.insert(
            "garage_phone",
            &self.garage_phone.as_deref().map(typst_escape),
        );
        ctx.insert("logo", &self.logo.as_deref().map(typst_string_escape));
        ctx.insert("invoice_number", &self.invoice_number);
        ctx.insert("issued_on", &self.issued_at.format("%d %b %Y").to_string());
        ctx.insert("customer_name", &typst_escape(&self.customer_name));
        ctx.insert("customer_phone", &typst_escape(&self.customer_phone));
        ctx.insert("bike_number", &typst_escape(&self.bike_number));
        ctx.insert("description", &typst_escape(&self.description));
        ctx.insert("lines", &lines);
        ctx.insert("currency", CURRENCY_SYMBOL);
        ctx.insert("parts_total", &self.totals.parts_total.to_string());
        ctx.insert("service_charge", &self.service_charge.to_string());
        ctx.insert("sub_total", &self.totals.sub_total.to_string());
        ctx.insert("grand_total", &self.totals.grand_total.to_string());

        let rendered = tera.render(TEMPLATE_NAME, &ctx)?;
        Ok(rendered.into_bytes())
    }
}

/// Escape text for a Typst string literal context (`"..."`).
fn typst_string_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape user-entered text for Typst markup context.
fn typst_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' | '#' | '[' | ']' | '*' | '_' | '`' | '$' | '@' | '<' | '>' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use garagekit_core::AggregateId;
    use garagekit_inventory::SparePartId;

    fn sample_document() -> InvoiceDocument {
        let lines = vec![PartLine {
            part_id: SparePartId::new(AggregateId::new()),
            part_number: "BRK-01".to_string(),
            name: "Brake Pads".to_string(),
            quantity: 2,
            unit_price: Money::from_minor(20000),
        }];
        let service_charge = Money::from_minor(15000);
        let totals = InvoiceTotals::compute(service_charge, &lines).unwrap();
        InvoiceDocument {
            garage_name: "Speed Motors".to_string(),
            garage_phone: Some("0300-1234567".to_string()),
            logo: None,
            invoice_number: "INV-20260830-0A1B2C3D".to_string(),
            issued_at: Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap(),
            customer_name: "Ali Raza".to_string(),
            customer_phone: "0312-7654321".to_string(),
            bike_number: "LEB-1234".to_string(),
            description: "brake noise".to_string(),
            lines,
            service_charge,
            totals,
        }
    }

    #[test]
    fn render_is_deterministic() {
        let doc = sample_document();
        assert_eq!(doc.render().unwrap(), doc.render().unwrap());
    }

    #[test]
    fn rendered_document_shows_header_and_bold_grand_total() {
        let doc = sample_document();
        let markup = String::from_utf8(doc.render().unwrap()).unwrap();

        assert!(markup.contains("INVOICE"));
        assert!(markup.contains("INV-20260830-0A1B2C3D"));
        assert!(markup.contains("Brake Pads"));
        assert!(markup.contains("Rs. 400.00"));
        assert!(markup.contains("Rs. 150.00"));
        assert!(markup.contains("#text(weight: \"bold\")[Grand Total: Rs. 550.00]"));
    }

    #[test]
    fn logo_renders_at_a_fixed_width_when_present() {
        let mut doc = sample_document();
        let without = String::from_utf8(doc.render().unwrap()).unwrap();
        assert!(!without.contains("#image("));

        doc.logo = Some("logos/speed-motors.png".to_string());
        let with = String::from_utf8(doc.render().unwrap()).unwrap();
        assert!(with.contains("#image(\"logos/speed-motors.png\", width: 30mm)"));
    }

    #[test]
    fn user_text_is_escaped_for_markup() {
        let mut doc = sample_document();
        doc.customer_name = "Ali #Raza [vip]".to_string();
        let markup = String::from_utf8(doc.render().unwrap()).unwrap();
        assert!(markup.contains("Ali \\#Raza \\[vip\\]"));
    }

    #[test]
    fn invoice_number_is_reproducible_from_id_and_date() {
        let invoice_id = InvoiceId::new(AggregateId::new());
        let issued_at = Utc.with_ymd_and_hms(2026, 8, 30, 9, 30, 0).unwrap();

        let a = invoice_number(invoice_id, issued_at);
        let b = invoice_number(invoice_id, issued_at);
        assert_eq!(a, b);
        assert!(a.starts_with("INV-20260830-"));
        assert_eq!(a.len(), "INV-20260830-".len() + 8);
    }
}
