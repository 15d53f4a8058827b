// src/pipeline.rs

use crate::bill_db::BillStore;
use crate::error::Result;
use crate::extract::extract;
use crate::normalize::{BillFields, normalize};
use crate::upload::Upload;
use crate::vision::{PROMPT, VisionModel};
use serde_json::Value;
use tracing::{debug, info};

/// Run one upload through the model and turn the answer into proposed fields.
/// Nothing is stored; the caller decides whether to [`commit`].
#[tracing::instrument(skip_all, fields(file = %upload.file_name))]
pub async fn propose(model: &dyn VisionModel, upload: &Upload) -> Result<BillFields> {
    let raw = model.infer(upload, PROMPT).await?;
    info!(chars = raw.len(), "Model responded");

    let extraction = extract(&raw);
    if extraction.is_fallback() {
        let raw = Value::Object(extraction.to_raw_object());
        debug!(raw = %raw, "Keeping unstructured model answer");
    }
    let fields = normalize(&extraction)?;
    info!(
        invoice_number = %fields.invoice_number,
        company = %fields.company_name,
        total_cost = fields.total_cost,
        bill_date = %fields.bill_date,
        "Proposed bill"
    );
    Ok(fields)
}

/// Store confirmed fields. Call once per user confirmation.
pub fn commit(store: &BillStore, fields: &BillFields) -> Result<i64> {
    store.add_fields(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillError;
    use async_trait::async_trait;

    /// Returns a canned response instead of calling a hosted model.
    struct CannedModel(&'static str);

    #[async_trait]
    impl VisionModel for CannedModel {
        async fn infer(&self, _upload: &Upload, prompt: &str) -> Result<String> {
            assert_eq!(prompt, PROMPT);
            Ok(self.0.to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl VisionModel for FailingModel {
        async fn infer(&self, _upload: &Upload, _prompt: &str) -> Result<String> {
            Err(BillError::Model("API error 503 Service Unavailable: ".to_string()))
        }
    }

    fn upload() -> Upload {
        Upload::new("bill.jpg", "image/jpeg", vec![0xff, 0xd8, 0xff]).unwrap()
    }

    fn test_store() -> (tempfile::TempDir, BillStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BillStore::open(dir.path().join("bills.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_fenced_response_is_committed() {
        let model = CannedModel(
            "```json\n{\"vendor_name\":\"Acme Co\",\"bill_date\":\"2024-01-05\",\"total_amount\":\"1,000.00\",\"invoice_number\":\"INV-1\"}\n```",
        );
        let fields = propose(&model, &upload()).await.unwrap();
        assert_eq!(
            fields,
            BillFields {
                invoice_number: "INV-1".to_string(),
                company_name: "Acme Co".to_string(),
                total_cost: 1000.00,
                bill_date: "2024-01-05".to_string(),
            }
        );

        let (_dir, store) = test_store();
        let id = commit(&store, &fields).unwrap();

        let newest = &store.list_all().unwrap()[0];
        assert_eq!(newest.id, id);
        assert_eq!(newest.invoice_number, "INV-1");
        assert_eq!(newest.company_name, "Acme Co");
        assert_eq!(newest.total_cost, 1000.00);
        assert_eq!(newest.bill_date, "2024-01-05");
    }

    #[tokio::test]
    async fn test_prose_response_is_not_committed() {
        let model = CannedModel("This looks like a receipt from a coffee shop.");
        let err = propose(&model, &upload()).await.unwrap_err();
        assert!(matches!(err, BillError::UnstructuredResponse));
    }

    #[tokio::test]
    async fn test_bad_amount_is_not_committed() {
        let model = CannedModel(r#"{"vendor_name": "Acme", "total_amount": "twelve"}"#);
        let err = propose(&model, &upload()).await.unwrap_err();
        assert!(matches!(err, BillError::MalformedAmount(_)));
    }

    #[tokio::test]
    async fn test_missing_total_reaches_review() {
        let model = CannedModel(
            r#"{"vendor_name": "Acme", "bill_date": "", "total_amount": null, "invoice_number": "INV-3"}"#,
        );
        let fields = propose(&model, &upload()).await.unwrap();
        assert_eq!(fields.company_name, "Acme");
        assert_eq!(fields.invoice_number, "INV-3");
        assert_eq!(fields.total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_empty_total_string_is_malformed() {
        let model = CannedModel(
            r#"{"vendor_name": "Acme", "bill_date": "", "total_amount": "", "invoice_number": "INV-3"}"#,
        );
        let err = propose(&model, &upload()).await.unwrap_err();
        assert!(matches!(err, BillError::MalformedAmount(ref t) if t.is_empty()));
    }

    #[tokio::test]
    async fn test_fallback_response_is_unstructured() {
        let model = CannedModel("```json\nnot json\n```");
        let err = propose(&model, &upload()).await.unwrap_err();
        assert!(matches!(err, BillError::UnstructuredResponse));
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let err = propose(&FailingModel, &upload()).await.unwrap_err();
        assert!(matches!(err, BillError::Model(_)));
    }

    #[test]
    fn test_edited_fields_are_committed_as_edited() {
        let (_dir, store) = test_store();
        let fields = BillFields {
            invoice_number: "INV-9".to_string(),
            company_name: "Edited Name".to_string(),
            total_cost: 12.5,
            bill_date: "2024-02-01".to_string(),
        };
        commit(&store, &fields).unwrap();
        let found = store.search("edited").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].total_cost, 12.5);
    }
}
