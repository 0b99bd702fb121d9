use chrono::{NaiveDate, NaiveDateTime};

use shared_models::{Appointment, EntityId, Payment, Provider, Service};

use crate::models::{InvoiceDocument, InvoiceLine};

/// `PREFIX-YYYYMMDD-NNNNN`, from the appointment id and the issue date.
pub fn invoice_number(prefix: &str, appointment_id: EntityId, issued_on: NaiveDate) -> String {
    format!("{}-{}-{:05}", prefix, issued_on.format("%Y%m%d"), appointment_id)
}

/// Turns invoice text into a document. Opaque encoder; failure only fails the document.
pub trait InvoiceRenderer: Send + Sync {
    fn render(&self, text: &str) -> Result<Vec<u8>, String>;
}

/// Renders the invoice as UTF-8 text.
pub struct PlainTextRenderer;

impl InvoiceRenderer for PlainTextRenderer {
    fn render(&self, text: &str) -> Result<Vec<u8>, String> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Everything an invoice shows about one appointment.
pub struct InvoiceSource<'a> {
    pub appointment: &'a Appointment,
    pub service: Option<&'a Service>,
    pub provider: Option<&'a Provider>,
    pub payment: Option<&'a Payment>,
}

pub struct InvoiceDraft {
    pub number: String,
    pub issued_at: NaiveDateTime,
    pub lines: Vec<InvoiceLine>,
    pub total: f64,
}

impl InvoiceDraft {
    pub fn compose(prefix: &str, source: &InvoiceSource<'_>, issued_at: NaiveDateTime) -> Self {
        let appointment = source.appointment;
        let number = invoice_number(prefix, appointment.id, issued_at.date());

        let mut lines = vec![
            line("Cliente", &appointment.client_name),
            line(
                "Servicio",
                source
                    .service
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| fallback("Servicio", appointment.service_id())),
            ),
            line(
                "Profesional",
                source
                    .provider
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| fallback("Profesional", appointment.provider_id())),
            ),
            line("Fecha", appointment.scheduled_at.format("%d/%m/%Y").to_string()),
            line("Hora", appointment.scheduled_at.format("%H:%M").to_string()),
        ];

        match source.payment {
            Some(payment) => {
                lines.push(line("Medio de pago", &payment.method));
                lines.push(line("Referencia", &payment.transaction_ref));
            }
            None => {
                if let Some(id) = appointment.payment.as_ref().map(|p| p.id()) {
                    lines.push(line("Pago", format!("#{}", id)));
                } else {
                    lines.push(line("Pago", "Sin pago registrado"));
                }
            }
        }

        let total = source
            .payment
            .map(|p| p.amount)
            .or_else(|| source.service.map(|s| s.price))
            .unwrap_or(0.0);
        lines.push(line("Total", format!("${:.2}", total)));

        Self {
            number,
            issued_at,
            lines,
            total,
        }
    }

    pub fn text(&self) -> String {
        let mut text = format!(
            "FACTURA {}\nEmitida: {}\n\n",
            self.number,
            self.issued_at.format("%d/%m/%Y %H:%M")
        );
        for line in &self.lines {
            text.push_str(&format!("{}: {}\n", line.label, line.value));
        }
        text
    }

    pub fn render(self, appointment_id: EntityId, renderer: &dyn InvoiceRenderer) -> Result<InvoiceDocument, String> {
        let bytes = renderer.render(&self.text())?;
        Ok(InvoiceDocument {
            number: self.number,
            appointment_id,
            issued_at: self.issued_at,
            lines: self.lines,
            total: self.total,
            bytes,
        })
    }
}

fn line(label: &str, value: impl Into<String>) -> InvoiceLine {
    InvoiceLine {
        label: label.to_string(),
        value: value.into(),
    }
}

fn fallback(label: &str, id: Option<EntityId>) -> String {
    match id {
        Some(id) => format!("{} #{}", label, id),
        None => "-".to_string(),
    }
}
