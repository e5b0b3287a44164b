use chrono::NaiveDateTime;
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Kinds of record a signature can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SignatureDocumentType {
    #[field(value = "document")]
    Document,
    #[field(value = "support_plan")]
    SupportPlan,
    #[field(value = "incident")]
    Incident,
    #[field(value = "daily_report")]
    DailyReport,
}

impl SignatureDocumentType {
    /// Table holding the signed rows; every one has a `facility_id` column.
    pub fn table(&self) -> &'static str {
        match self {
            SignatureDocumentType::Document => "documents",
            SignatureDocumentType::SupportPlan => "support_plans",
            SignatureDocumentType::Incident => "incidents",
            SignatureDocumentType::DailyReport => "daily_reports",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignatureDocumentType::Document => "書類",
            SignatureDocumentType::SupportPlan => "個別支援計画",
            SignatureDocumentType::Incident => "事故報告",
            SignatureDocumentType::DailyReport => "日報",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Signature {
    pub id: i64,
    pub document_type: SignatureDocumentType,
    pub document_id: i64,
    pub signer_name: String,
    pub signer_role: Option<String>,
    pub media_id: Option<i64>,
    pub signed_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignatureInput {
    pub document_type: SignatureDocumentType,
    pub document_id: i64,
    #[validate(length(min = 1, max = 100, message = "署名者名は1〜100文字で入力してください。"))]
    pub signer_name: String,
    #[validate(length(max = 100, message = "署名者の立場は100文字以内で入力してください。"))]
    pub signer_role: Option<String>,
    pub media_id: Option<i64>,
    pub signed_at: Option<NaiveDateTime>,
}
