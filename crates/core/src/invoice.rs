//! Invoice-level helpers around the allocator: reading the payment amount out
//! of free text, splitting VAT off a gross amount, and advancing invoice
//! numbers.

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::cpq::allocator::{AllocationError, Allocator};
use crate::cpq::catalog::Catalog;
use crate::cpq::pricing::round_money;
use crate::cpq::resolver::{parse_product_hints, NameResolver};
use crate::domain::allocation::Allocation;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("no amount found in `{0}`")]
    MissingAmount(String),
    #[error("invoice number `{0}` must contain at least one digit")]
    InvalidInvoiceNumber(String),
    #[error("vat rate must be zero or positive, got {0}")]
    InvalidVatRate(Decimal),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Returns the first number written in `text`: a run of digits with at most
/// one decimal point followed by more digits. `"£1,200"` reads as `1`.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;

    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }

    text.get(start..end)?.parse::<Decimal>().ok()
}

/// VAT-inclusive amount split into its net and tax parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatSplit {
    pub gross: Decimal,
    pub net: Decimal,
    pub vat: Decimal,
    pub rate: Decimal,
}

impl VatSplit {
    pub fn from_gross(gross: Decimal, rate: Decimal) -> Result<Self, InvoiceError> {
        if rate < Decimal::ZERO {
            return Err(InvoiceError::InvalidVatRate(rate));
        }

        let net = round_money(gross / (Decimal::ONE + rate));
        Ok(Self { gross, net, vat: gross - net, rate })
    }
}

/// Increments every digit run in `current`, keeping its zero padding:
/// `ABC123` becomes `ABC124`, `INV-0099` becomes `INV-0100`, `9` becomes `10`.
pub fn next_invoice_number(current: &str) -> Result<String, InvoiceError> {
    if !current.chars().any(|ch| ch.is_ascii_digit()) {
        return Err(InvoiceError::InvalidInvoiceNumber(current.to_string()));
    }

    let mut output = String::with_capacity(current.len() + 1);
    let mut digits = String::new();
    for ch in current.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if !digits.is_empty() {
            output.push_str(&increment_digits(&digits));
            digits.clear();
        }
        output.push(ch);
    }
    if !digits.is_empty() {
        output.push_str(&increment_digits(&digits));
    }

    Ok(output)
}

fn increment_digits(digits: &str) -> String {
    let mut bytes = digits.as_bytes().to_vec();
    for byte in bytes.iter_mut().rev() {
        if *byte == b'9' {
            *byte = b'0';
        } else {
            *byte += 1;
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    format!("1{}", String::from_utf8_lossy(&bytes))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvoiceRequest {
    /// Free-text payment amount, VAT inclusive (`"£1200 for the lot"`).
    pub amount_text: String,
    /// Comma-separated product hints; empty or `.` means any product.
    pub products_text: String,
    pub invoice_number: String,
    pub vat_rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub invoice_number: String,
    pub next_invoice_number: String,
    pub product_hints: Vec<String>,
    pub vat: VatSplit,
    pub allocation: Allocation,
}

impl InvoiceDraft {
    /// Allocates line items against the net part of the requested amount.
    pub fn build<R, G>(
        allocator: &Allocator<R>,
        catalog: &Catalog,
        request: &InvoiceRequest,
        rng: &mut G,
    ) -> Result<Self, InvoiceError>
    where
        R: NameResolver,
        G: Rng + ?Sized,
    {
        let gross = parse_amount(&request.amount_text)
            .ok_or_else(|| InvoiceError::MissingAmount(request.amount_text.clone()))?;
        let vat = VatSplit::from_gross(gross, request.vat_rate)?;
        let next_invoice_number = next_invoice_number(&request.invoice_number)?;
        let product_hints = parse_product_hints(&request.products_text);

        let allocation = allocator.allocate(catalog, &product_hints, vat.net, rng)?;

        info!(
            event_name = "invoice.drafted",
            invoice_number = %request.invoice_number,
            gross = %vat.gross,
            net = %vat.net,
            allocated = %allocation.total(),
            "invoice draft built"
        );

        Ok(Self {
            invoice_number: request.invoice_number.clone(),
            next_invoice_number,
            product_hints,
            vat,
            allocation,
        })
    }
}
