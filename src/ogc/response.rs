//! Parsing of WFS-T transaction responses.
//!
//! Three outcomes are kept apart:
//!
//! 1. An OGC/OWS exception report is a failure carrying the exception text.
//! 2. A TransactionResponse whose totals are all zero but which carries
//!    per-action `Message` elements is a failure; the messages become the
//!    error. A genuinely empty transaction that also carries an informational
//!    message is classified the same way.
//! 3. Anything else is a success. Messages are kept as a non-fatal warning
//!    (QGIS Server reports partial failures inside a successful response).

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ServerTransactionError};
use crate::xml::{self, XmlElement};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub success: bool,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inserted_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partial_failures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionOutcome {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    pub fn is_partial(&self) -> bool {
        self.success && !self.partial_failures.is_empty()
    }

    pub fn into_result(self) -> Result<Self, ServerTransactionError> {
        if self.success {
            Ok(self)
        } else {
            Err(ServerTransactionError {
                message: self
                    .error
                    .unwrap_or_else(|| "transaction failed".to_string()),
            })
        }
    }
}

fn texts(root: &XmlElement, local_name: &str) -> Vec<String> {
    root.descendants(local_name)
        .into_iter()
        .map(XmlElement::deep_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn count(root: &XmlElement, local_name: &str) -> usize {
    root.descendants(local_name)
        .first()
        .and_then(|el| el.text().parse().ok())
        .unwrap_or(0)
}

fn exception_text(root: &XmlElement) -> Option<String> {
    let is_report = matches!(
        root.local_name(),
        "ExceptionReport" | "ServiceExceptionReport"
    );
    let exceptions = root.descendants("Exception").len() + root.descendants("ServiceException").len();
    if !is_report && exceptions == 0 {
        return None;
    }
    let mut parts = texts(root, "ExceptionText");
    if parts.is_empty() {
        parts = texts(root, "ServiceException");
    }
    if parts.is_empty() {
        let all = root.deep_text();
        parts.push(if all.is_empty() {
            root.local_name().to_string()
        } else {
            all
        });
    }
    Some(parts.join("; "))
}

fn inserted_ids(root: &XmlElement) -> Vec<String> {
    let scopes = {
        let results = root.descendants("InsertResults");
        if results.is_empty() {
            root.descendants("InsertResult")
        } else {
            results
        }
    };
    scopes
        .into_iter()
        .flat_map(|scope| scope.descendants("FeatureId"))
        .filter_map(|el| el.attr("fid").map(str::to_string))
        .collect()
}

/// WFS 1.0 `TransactionResult/Status` child name (`SUCCESS`, `FAILED`, `PARTIAL`).
fn legacy_status(root: &XmlElement) -> Option<String> {
    root.descendants("Status")
        .first()
        .and_then(|s| s.children.first())
        .map(|c| c.local_name().to_ascii_uppercase())
}

/// Parse the raw XML returned by the server for a Transaction request.
pub fn parse_transaction_response(text: &str) -> Result<TransactionOutcome, ParseError> {
    let root = xml::parse(text)?;

    if let Some(error) = exception_text(&root) {
        return Ok(TransactionOutcome::failure(error));
    }

    let root_name = root.local_name();
    if root_name != "TransactionResponse" && root_name != "WFS_TransactionResponse" {
        return Err(ParseError::shape(
            "transaction response",
            format!("unexpected root element <{}>", root.name),
        ));
    }

    let messages = texts(&root, "Message");
    let ids = inserted_ids(&root);

    if let Some(status) = legacy_status(&root) {
        if status == "FAILED" {
            let error = if messages.is_empty() {
                "transaction failed".to_string()
            } else {
                messages.join("; ")
            };
            return Ok(TransactionOutcome::failure(error));
        }
    }

    let mut outcome = TransactionOutcome {
        success: true,
        inserted: count(&root, "totalInserted").max(ids.len()),
        updated: count(&root, "totalUpdated"),
        deleted: count(&root, "totalDeleted"),
        inserted_ids: ids,
        ..TransactionOutcome::default()
    };

    let is_legacy = root_name == "WFS_TransactionResponse";
    if !is_legacy && outcome.total() == 0 && !messages.is_empty() {
        return Ok(TransactionOutcome::failure(messages.join("; ")));
    }

    if !messages.is_empty() {
        outcome.warning = Some(messages.join("; "));
        outcome.partial_failures = messages;
    }
    Ok(outcome)
}
