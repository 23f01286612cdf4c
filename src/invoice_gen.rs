use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bigdecimal::{BigDecimal, Zero};
use tracing::{info, warn};

use crate::config::OutputConfig;
use crate::error::{InvoicerError, Result};
use crate::models::InvoiceDocument;

/// Paths of the artifacts written for one invoice. A `None` was disabled or failed.
#[derive(Debug, Default)]
pub struct GeneratedFiles {
    pub html: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

/// Service for generating invoice files in HTML, PDF and JSON format
pub struct InvoiceGenerator {
    output: OutputConfig,
    logo_base64: Option<String>,
    pdf: PdfConverter,
}

impl InvoiceGenerator {
    pub fn new(output: &OutputConfig) -> Result<Self> {
        // Create the output directory if it doesn't exist
        if !output.output_dir.exists() {
            fs::create_dir_all(&output.output_dir)?;
        }

        let logo_base64 = match &output.logo_path {
            Some(path) if path.exists() => Some(STANDARD.encode(fs::read(path)?)),
            Some(path) => {
                warn!(path = %path.display(), "logo not found, rendering without it");
                None
            }
            None => None,
        };

        Ok(Self {
            output: output.clone(),
            logo_base64,
            pdf: PdfConverter::default(),
        })
    }

    #[cfg(test)]
    pub fn with_pdf_converter(mut self, pdf: PdfConverter) -> Self {
        self.pdf = pdf;
        self
    }

    /// Write the enabled artifacts for `invoice`, named after its id.
    ///
    /// A failed PDF conversion is logged and leaves `pdf` empty; it never fails the run.
    pub fn generate_invoice(&self, invoice: &InvoiceDocument) -> Result<GeneratedFiles> {
        let mut files = GeneratedFiles::default();
        let path_for = |extension: &str| {
            self.output
                .output_dir
                .join(format!("{}.{}", invoice.invoice_id, extension))
        };

        if self.output.generate_html {
            let html_path = path_for("html");
            let mut file = File::create(&html_path)?;
            file.write_all(self.render_html(invoice).as_bytes())?;
            files.html = Some(html_path);
        }

        if self.output.generate_pdf {
            match &files.html {
                Some(html_path) => {
                    let pdf_path = path_for("pdf");
                    match self.pdf.convert(html_path, &pdf_path) {
                        Ok(()) => files.pdf = Some(pdf_path),
                        Err(e) => warn!(error = %e, "PDF not generated"),
                    }
                }
                None => warn!("PDF output needs the HTML document, which is disabled"),
            }
        }

        if self.output.generate_json {
            let json_path = path_for("json");
            let mut file = File::create(&json_path)?;
            file.write_all(serde_json::to_string_pretty(invoice)?.as_bytes())?;
            files.json = Some(json_path);
        }

        info!(invoice = %invoice.invoice_id, "invoice files written");
        Ok(files)
    }

    /// Generate the HTML statement for the invoice
    pub fn render_html(&self, invoice: &InvoiceDocument) -> String {
        let mut content = String::new();
        let id = escape(&invoice.invoice_id);

        content.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
        content.push_str(&format!("<title>Invoice {}</title>\n", id));
        content.push_str(STYLE);
        content.push_str("</head>\n<body>\n");

        // Header: logo (or company name) and title
        content.push_str("<div class=\"header\">\n");
        match &self.logo_base64 {
            Some(logo) => content.push_str(&format!(
                "<img src=\"data:image/png;base64,{}\" alt=\"{}\" class=\"logo\">\n",
                logo,
                escape(&invoice.payable_to.name)
            )),
            None => content.push_str(&format!(
                "<div class=\"company\">{}</div>\n",
                escape(&invoice.payable_to.name)
            )),
        }
        content.push_str("<div class=\"invoice-title\">INVOICE</div>\n</div>\n\n");

        // Bill-to block
        let client = &invoice.bill_to;
        content.push_str("<div class=\"invoice-info\">\n");
        content.push_str(&format!("<div><strong>Invoice No.:</strong> {}</div>\n", id));
        content.push_str(&format!("<div><strong>Bill To:</strong> {}</div>\n", escape(&client.name)));
        for line in [&client.address, &client.city_state_zip] {
            if !line.is_empty() {
                content.push_str(&format!("<div>{}</div>\n", escape(line)));
            }
        }
        if !client.customer_id.is_empty() {
            content.push_str(&format!(
                "<div><strong>Customer ID:</strong> {}</div>\n",
                escape(&client.customer_id)
            ));
        }
        content.push_str("</div>\n\n");

        // Terms table
        content.push_str("<table>\n<thead>\n<tr>");
        for heading in ["Date", "Invoice No.", "Sales Rep.", "Ship Via", "Terms", "Date Due"] {
            content.push_str(&format!("<th>{}</th>", heading));
        }
        content.push_str("</tr>\n</thead>\n<tbody>\n<tr>");
        content.push_str(&format!("<td>{}</td>", invoice.issue_date.format("%m/%d/%Y")));
        content.push_str(&format!("<td>{}</td>", id));
        content.push_str(&format!("<td>{}</td>", escape(&invoice.sales_rep)));
        content.push_str("<td>Email</td>");
        content.push_str(&format!("<td>{}</td>", escape(&invoice.terms)));
        content.push_str(&format!("<td>{}</td>", invoice.due_date.format("%m/%d/%Y")));
        content.push_str("</tr>\n</tbody>\n</table>\n\n");

        // One summary line per category
        content.push_str("<table>\n<thead>\n<tr>");
        for heading in ["Quantity", "Item", "Description", "Discount", "Taxable", "Unit Price", "Total"] {
            content.push_str(&format!("<th>{}</th>", heading));
        }
        content.push_str("</tr>\n</thead>\n<tbody>\n");
        for group in &invoice.line_items {
            let discount = if invoice.discount_per_hour.is_zero() {
                "-".to_string()
            } else {
                format!(
                    "{} / hr off<br>{} / hr",
                    format_money(&invoice.discount_per_hour),
                    format_money(&(&group.rate + &invoice.discount_per_hour))
                )
            };
            content.push_str("<tr>");
            content.push_str(&format!("<td>{}</td>", format_hours(&group.hours)));
            content.push_str(&format!("<td>{}</td>", escape(&group.category)));
            content.push_str("<td>See attached</td>");
            content.push_str(&format!("<td>{}</td>", discount));
            content.push_str("<td>No</td>");
            content.push_str(&format!("<td class=\"amount\">{}</td>", format_money(&group.rate)));
            content.push_str(&format!("<td class=\"amount\">{}</td>", format_money(&group.amount)));
            content.push_str("</tr>\n");
        }
        content.push_str("</tbody>\n</table>\n\n");

        // Payment details
        let company = &invoice.payable_to;
        content.push_str("<div class=\"payment-info\">\n");
        content.push_str(&format!(
            "<strong>Please make all checks payable to:</strong> {}<br>\n",
            escape(&company.name)
        ));
        if !company.address.is_empty() {
            content.push_str(&format!(
                "<strong>Please send checks to:</strong> {}<br>\n",
                escape(&company.address)
            ));
        }
        if let Some(zelle) = &company.zelle {
            content.push_str(&format!("<strong>Zelle:</strong> {}\n", escape(zelle)));
        }
        content.push_str("</div>\n\n");

        // Totals
        content.push_str("<table class=\"totals-table\">\n<tbody>\n");
        content.push_str(&format!(
            "<tr><td><strong>Total Hours:</strong></td><td class=\"amount\">{}</td></tr>\n",
            format_hours(&invoice.total_hours)
        ));
        content.push_str(&format!(
            "<tr><td><strong>Subtotal:</strong></td><td class=\"amount\">{}</td></tr>\n",
            format_money(&invoice.subtotal)
        ));
        content.push_str(&format!(
            "<tr><td><strong>Tax:</strong></td><td class=\"amount\">{}</td></tr>\n",
            format_money(&invoice.tax)
        ));
        content.push_str(&format!(
            "<tr><td><strong>Balance Due:</strong></td><td class=\"amount\">{}</td></tr>\n",
            format_money(&invoice.balance_due)
        ));
        content.push_str("</tbody>\n</table>\n\n");

        // Time entry details, grouped by category
        content.push_str("<div class=\"time-details\">\n<h2>Time Entry Details</h2>\n<table>\n<thead>\n<tr>");
        for heading in ["Date", "Hours", "Category", "Task/Work", "Persons"] {
            content.push_str(&format!("<th>{}</th>", heading));
        }
        content.push_str("</tr>\n</thead>\n<tbody>\n");
        for group in &invoice.line_items {
            for entry in &group.entries {
                content.push_str("<tr>");
                content.push_str(&format!("<td>{}</td>", escape(&entry.date)));
                content.push_str(&format!("<td>{}</td>", format_hours(&entry.hours)));
                content.push_str(&format!("<td>{}</td>", escape(&entry.category)));
                content.push_str(&format!("<td>{}</td>", escape(&entry.description)));
                content.push_str(&format!("<td>{}</td>", escape(&entry.persons)));
                content.push_str("</tr>\n");
            }
            content.push_str(&format!(
                "<tr class=\"subtotal\"><td>{} subtotal</td><td>{}</td><td colspan=\"3\"></td></tr>\n",
                escape(&group.category),
                format_hours(&group.hours)
            ));
        }
        content.push_str("</tbody>\n</table>\n</div>\n</body>\n</html>\n");

        content
    }
}

const STYLE: &str = r#"<style>
body { font-family: Arial, sans-serif; margin: 20px; color: #333; line-height: 1.4; }
.header { display: flex; justify-content: space-between; align-items: flex-start; margin-bottom: 30px; }
.logo { max-width: 300px; height: auto; }
.company { font-size: 28px; font-weight: bold; }
.invoice-title { font-size: 48px; font-weight: bold; color: #666; text-align: right; }
.invoice-info { margin-bottom: 20px; }
.invoice-info div { margin-bottom: 8px; }
table { width: 100%; border-collapse: collapse; margin-bottom: 20px; }
th, td { border: 1px solid #ccc; padding: 8px; text-align: left; }
th { background-color: #f0f0f0; font-weight: bold; }
.amount { text-align: right; }
.payment-info { margin: 20px 0; line-height: 1.6; }
.totals-table { width: 300px; float: right; margin-top: 20px; }
.time-details { clear: both; margin-top: 40px; }
.time-details h2 { font-size: 24px; margin-bottom: 15px; }
.subtotal td { font-weight: bold; background-color: #fafafa; }
</style>
"#;

/// Converts the HTML statement into a print-ready PDF with wkhtmltopdf.
pub struct PdfConverter {
    binary: String,
}

impl Default for PdfConverter {
    fn default() -> Self {
        Self::with_binary("wkhtmltopdf")
    }
}

impl PdfConverter {
    pub fn with_binary(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    pub fn convert(&self, html_path: &Path, pdf_path: &Path) -> Result<()> {
        let binary = which::which(&self.binary)
            .map_err(|e| InvoicerError::Render(format!("{} not available: {}", self.binary, e)))?;

        let output = Command::new(binary)
            .args(["--page-size", "A4"])
            .args(["--margin-top", "0.75in", "--margin-right", "0.75in"])
            .args(["--margin-bottom", "0.75in", "--margin-left", "0.75in"])
            .args(["--encoding", "UTF-8", "--quiet"])
            .arg(html_path)
            .arg(pdf_path)
            .output()
            .map_err(|e| InvoicerError::Render(format!("could not run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(InvoicerError::Render(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                error.trim()
            )));
        }

        info!(path = %pdf_path.display(), "PDF generated");
        Ok(())
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Hours to at most two decimals, without trailing zeros.
pub fn format_hours(hours: &BigDecimal) -> String {
    let text = hours.round(2).with_scale(2).to_string();
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Dollar amount with two decimals and thousands separators.
pub fn format_money(amount: &BigDecimal) -> String {
    let text = amount.round(2).with_scale(2).to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::new();
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}${}.{}", sign, grouped, fraction)
}
