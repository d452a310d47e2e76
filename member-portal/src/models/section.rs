// Application sections: identifiers, typed schemas and field-level mutation
//
// Every section is an explicit struct. Server payloads are coerced into these
// structs at the API boundary (`SectionData::from_payload`); nothing downstream
// handles untyped JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::document::{DocumentRef, StagedFile};
use crate::utils::validation::{
    validate_amount, validate_email, validate_iso_date, validate_percentage, validate_phone,
    validate_required, validate_website,
};
use crate::widgets::fields::{deserialize_flag, FieldKind, FieldSpec, FieldValue, YesNo};

/// Field name (or `list[index].field`) -> user-facing message.
pub type FieldErrors = BTreeMap<String, String>;

// =========================
// Identifiers
// =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionId {
    CompanyDetails,
    FinancialThresholds,
    DataProtectionPrivacy,
    ComplianceDeclarations,
    SupportingDocuments,
}

impl SectionId {
    pub const ALL: [SectionId; 5] = [
        SectionId::CompanyDetails,
        SectionId::FinancialThresholds,
        SectionId::DataProtectionPrivacy,
        SectionId::ComplianceDeclarations,
        SectionId::SupportingDocuments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionId::CompanyDetails => "companyDetails",
            SectionId::FinancialThresholds => "financialThresholds",
            SectionId::DataProtectionPrivacy => "dataProtectionPrivacy",
            SectionId::ComplianceDeclarations => "complianceDeclarations",
            SectionId::SupportingDocuments => "supportingDocuments",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SectionId::CompanyDetails => "Company Details",
            SectionId::FinancialThresholds => "Financial Thresholds",
            SectionId::DataProtectionPrivacy => "Data Protection & Privacy",
            SectionId::ComplianceDeclarations => "Compliance Declarations",
            SectionId::SupportingDocuments => "Supporting Documents",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Membership tier; determines which sections the wizard walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MembershipType {
    #[default]
    Principal,
    Associate,
}

impl MembershipType {
    pub fn sections(&self) -> &'static [SectionId] {
        match self {
            MembershipType::Principal => &SectionId::ALL,
            MembershipType::Associate => &[
                SectionId::CompanyDetails,
                SectionId::DataProtectionPrivacy,
                SectionId::ComplianceDeclarations,
                SectionId::SupportingDocuments,
            ],
        }
    }

    pub fn total_steps(&self) -> usize {
        self.sections().len()
    }

    /// Section shown at a 1-indexed step.
    pub fn section_for_step(&self, step: usize) -> Option<SectionId> {
        step.checked_sub(1)
            .and_then(|i| self.sections().get(i))
            .copied()
    }

    pub fn step_of(&self, section: SectionId) -> Option<usize> {
        self.sections()
            .iter()
            .position(|s| *s == section)
            .map(|i| i + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RepeatingList {
    Shareholders,
    Ubos,
    Directors,
}

impl RepeatingList {
    pub fn key(&self) -> &'static str {
        match self {
            RepeatingList::Shareholders => "shareholders",
            RepeatingList::Ubos => "ubos",
            RepeatingList::Directors => "directors",
        }
    }

    pub fn item_label(&self) -> &'static str {
        match self {
            RepeatingList::Shareholders => "Shareholder",
            RepeatingList::Ubos => "UBO",
            RepeatingList::Directors => "Director",
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            RepeatingList::Shareholders => Shareholder::FIELDS,
            RepeatingList::Ubos => Ubo::FIELDS,
            RepeatingList::Directors => Director::FIELDS,
        }
    }

    /// Wire name of the record's attachment.
    pub fn document_key(&self) -> &'static str {
        match self {
            RepeatingList::Shareholders => "proofFile",
            RepeatingList::Ubos | RepeatingList::Directors => "idDocument",
        }
    }

    pub fn document_label(&self) -> &'static str {
        match self {
            RepeatingList::Shareholders => "Proof of shareholding",
            RepeatingList::Ubos | RepeatingList::Directors => "ID / passport copy",
        }
    }
}

impl fmt::Display for RepeatingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Where a single-file attachment lives inside a section.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentSlot {
    Field(String),
    Item { list: RepeatingList, index: usize },
}

impl DocumentSlot {
    pub fn field(key: &str) -> Self {
        DocumentSlot::Field(key.to_string())
    }
}

impl fmt::Display for DocumentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSlot::Field(key) => write!(f, "{}", key),
            DocumentSlot::Item { list, index } => write!(f, "{}[{}]", list, index),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub gated_by: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct MultiDocumentSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub max_files: usize,
}

// =========================
// Errors
// =========================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SectionError {
    #[error("'{field}' is not a field of {scope}")]
    UnknownField { scope: String, field: String },
    #[error("'{field}' expects a {expected} value")]
    WrongKind { field: String, expected: FieldKind },
    #[error("'{field}' is disabled until its question is answered Yes")]
    FieldDisabled { field: String },
    #[error("'{slot}' is not a document slot of {section}")]
    UnknownDocumentSlot { section: SectionId, slot: String },
    #[error("{section} has no {list} list")]
    UnsupportedList {
        section: SectionId,
        list: RepeatingList,
    },
    #[error("{list}[{index}] is out of range (len {len})")]
    IndexOutOfRange {
        list: RepeatingList,
        index: usize,
        len: usize,
    },
    #[error("no file selected")]
    NoFileSelected,
    #[error("expected {expected} data but got {actual}")]
    SectionMismatch {
        expected: SectionId,
        actual: SectionId,
    },
    #[error("invalid {section} payload: {message}")]
    Payload { section: SectionId, message: String },
}

// =========================
// Field assignment helpers
// =========================

fn unknown_field(scope: &str, field: &str) -> SectionError {
    SectionError::UnknownField {
        scope: scope.to_string(),
        field: field.to_string(),
    }
}

fn assign_text(slot: &mut String, field: &str, value: FieldValue) -> Result<(), SectionError> {
    match value {
        FieldValue::Text(s) => {
            *slot = s;
            Ok(())
        }
        _ => Err(SectionError::WrongKind {
            field: field.to_string(),
            expected: FieldKind::Text,
        }),
    }
}

fn assign_yes_no(
    slot: &mut Option<YesNo>,
    field: &str,
    value: FieldValue,
) -> Result<(), SectionError> {
    match value {
        FieldValue::YesNo(v) => {
            *slot = v;
            Ok(())
        }
        _ => Err(SectionError::WrongKind {
            field: field.to_string(),
            expected: FieldKind::YesNo,
        }),
    }
}

fn assign_checked(slot: &mut bool, field: &str, value: FieldValue) -> Result<(), SectionError> {
    match value {
        FieldValue::Checked(v) => {
            *slot = v;
            Ok(())
        }
        _ => Err(SectionError::WrongKind {
            field: field.to_string(),
            expected: FieldKind::Checkbox,
        }),
    }
}

fn text(s: &str) -> Option<FieldValue> {
    Some(FieldValue::Text(s.to_string()))
}

fn check(errors: &mut FieldErrors, key: impl Into<String>, result: Result<(), String>) {
    if let Err(msg) = result {
        errors.entry(key.into()).or_insert(msg);
    }
}

fn require_answer(errors: &mut FieldErrors, key: &str, answer: Option<YesNo>) {
    if answer.is_none() {
        errors.insert(key.to_string(), "Please answer Yes or No".to_string());
    }
}

fn require_document(errors: &mut FieldErrors, key: &str, label: &str, doc: &DocumentRef) {
    if !doc.is_set() {
        errors.insert(key.to_string(), format!("{} is required", label));
    }
}

// =========================
// Repeating records
// =========================

/// A record in one of the company's repeating lists (shareholders, UBOs, directors).
pub trait RepeatingRecord: Default + Clone {
    const FIELDS: &'static [FieldSpec];
    const SCOPE: &'static str;

    fn field(&self, name: &str) -> Option<FieldValue>;
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError>;
    fn document(&self) -> &DocumentRef;
    fn document_mut(&mut self) -> &mut DocumentRef;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Shareholder {
    pub name: String,
    pub nationality: String,
    pub ownership_percentage: String,
    pub proof_file: DocumentRef,
}

impl RepeatingRecord for Shareholder {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("name", "Full name"),
        FieldSpec::text("nationality", "Nationality"),
        FieldSpec::text("ownershipPercentage", "Ownership %"),
    ];
    const SCOPE: &'static str = "shareholder";

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => text(&self.name),
            "nationality" => text(&self.nationality),
            "ownershipPercentage" => text(&self.ownership_percentage),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        match name {
            "name" => assign_text(&mut self.name, name, value),
            "nationality" => assign_text(&mut self.nationality, name, value),
            "ownershipPercentage" => assign_text(&mut self.ownership_percentage, name, value),
            _ => Err(unknown_field(Self::SCOPE, name)),
        }
    }

    fn document(&self) -> &DocumentRef {
        &self.proof_file
    }

    fn document_mut(&mut self) -> &mut DocumentRef {
        &mut self.proof_file
    }
}

/// Ultimate beneficial owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ubo {
    pub name: String,
    pub nationality: String,
    pub ownership_percentage: String,
    pub id_document: DocumentRef,
}

impl RepeatingRecord for Ubo {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("name", "Full name"),
        FieldSpec::text("nationality", "Nationality"),
        FieldSpec::text("ownershipPercentage", "Ownership %"),
    ];
    const SCOPE: &'static str = "ubo";

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => text(&self.name),
            "nationality" => text(&self.nationality),
            "ownershipPercentage" => text(&self.ownership_percentage),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        match name {
            "name" => assign_text(&mut self.name, name, value),
            "nationality" => assign_text(&mut self.nationality, name, value),
            "ownershipPercentage" => assign_text(&mut self.ownership_percentage, name, value),
            _ => Err(unknown_field(Self::SCOPE, name)),
        }
    }

    fn document(&self) -> &DocumentRef {
        &self.id_document
    }

    fn document_mut(&mut self) -> &mut DocumentRef {
        &mut self.id_document
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Director {
    pub name: String,
    pub nationality: String,
    pub position: String,
    pub id_document: DocumentRef,
}

impl RepeatingRecord for Director {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("name", "Full name"),
        FieldSpec::text("nationality", "Nationality"),
        FieldSpec::text("position", "Position"),
    ];
    const SCOPE: &'static str = "director";

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => text(&self.name),
            "nationality" => text(&self.nationality),
            "position" => text(&self.position),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        match name {
            "name" => assign_text(&mut self.name, name, value),
            "nationality" => assign_text(&mut self.nationality, name, value),
            "position" => assign_text(&mut self.position, name, value),
            _ => Err(unknown_field(Self::SCOPE, name)),
        }
    }

    fn document(&self) -> &DocumentRef {
        &self.id_document
    }

    fn document_mut(&mut self) -> &mut DocumentRef {
        &mut self.id_document
    }
}

/// Object-safe view over a `Vec<R: RepeatingRecord>`.
trait ListAccess {
    fn len(&self) -> usize;
    fn push_default(&mut self) -> usize;
    fn remove(&mut self, index: usize) -> DocumentRef;
    fn field(&self, index: usize, name: &str) -> Option<FieldValue>;
    fn set_field(&mut self, index: usize, name: &str, value: FieldValue)
        -> Result<(), SectionError>;
    fn document(&self, index: usize) -> Option<&DocumentRef>;
    fn document_mut(&mut self, index: usize) -> Option<&mut DocumentRef>;
}

impl<R: RepeatingRecord> ListAccess for Vec<R> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn push_default(&mut self) -> usize {
        self.push(R::default());
        Vec::len(self) - 1
    }

    fn remove(&mut self, index: usize) -> DocumentRef {
        Vec::remove(self, index).document().clone()
    }

    fn field(&self, index: usize, name: &str) -> Option<FieldValue> {
        self.get(index).and_then(|r| r.field(name))
    }

    fn set_field(
        &mut self,
        index: usize,
        name: &str,
        value: FieldValue,
    ) -> Result<(), SectionError> {
        match self.get_mut(index) {
            Some(r) => r.set_field(name, value),
            None => Err(unknown_field(R::SCOPE, name)),
        }
    }

    fn document(&self, index: usize) -> Option<&DocumentRef> {
        self.get(index).map(|r| r.document())
    }

    fn document_mut(&mut self, index: usize) -> Option<&mut DocumentRef> {
        self.get_mut(index).map(|r| r.document_mut())
    }
}

// =========================
// Section schemas
// =========================

/// Per-section schema: recognised fields, attachments and submission-time validation.
trait SectionSchema {
    fn id(&self) -> SectionId;
    fn fields(&self) -> &'static [FieldSpec];
    fn field(&self, name: &str) -> Option<FieldValue>;
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError>;
    fn validate(&self) -> FieldErrors;

    fn document_specs(&self) -> &'static [DocumentSpec] {
        &[]
    }

    fn document_field(&self, _key: &str) -> Option<&DocumentRef> {
        None
    }

    fn document_field_mut(&mut self, _key: &str) -> Option<&mut DocumentRef> {
        None
    }

    fn multi_document_specs(&self) -> &'static [MultiDocumentSpec] {
        &[]
    }

    fn multi_documents(&self, _key: &str) -> Option<&Vec<DocumentRef>> {
        None
    }

    fn multi_documents_mut(&mut self, _key: &str) -> Option<&mut Vec<DocumentRef>> {
        None
    }

    fn lists(&self) -> &'static [RepeatingList] {
        &[]
    }

    fn list(&self, _list: RepeatingList) -> Option<&dyn ListAccess> {
        None
    }

    fn list_mut(&mut self, _list: RepeatingList) -> Option<&mut dyn ListAccess> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyDetails {
    pub company_name: String,
    pub trade_license_number: String,
    pub license_expiry_date: String,
    pub registered_address: String,
    pub website: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub trade_license_file: DocumentRef,
    pub articles_of_association: DocumentRef,
    pub shareholders: Vec<Shareholder>,
    pub ubos: Vec<Ubo>,
    pub directors: Vec<Director>,
}

impl SectionSchema for CompanyDetails {
    fn id(&self) -> SectionId {
        SectionId::CompanyDetails
    }

    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::text("companyName", "Company name"),
            FieldSpec::text("tradeLicenseNumber", "Trade licence number"),
            FieldSpec::text("licenseExpiryDate", "Licence expiry (YYYY-MM-DD)"),
            FieldSpec::text("registeredAddress", "Registered address"),
            FieldSpec::text("website", "Website"),
            FieldSpec::text("contactEmail", "Contact email"),
            FieldSpec::text("contactPhone", "Contact phone"),
        ];
        FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "companyName" => text(&self.company_name),
            "tradeLicenseNumber" => text(&self.trade_license_number),
            "licenseExpiryDate" => text(&self.license_expiry_date),
            "registeredAddress" => text(&self.registered_address),
            "website" => text(&self.website),
            "contactEmail" => text(&self.contact_email),
            "contactPhone" => text(&self.contact_phone),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        match name {
            "companyName" => assign_text(&mut self.company_name, name, value),
            "tradeLicenseNumber" => assign_text(&mut self.trade_license_number, name, value),
            "licenseExpiryDate" => assign_text(&mut self.license_expiry_date, name, value),
            "registeredAddress" => assign_text(&mut self.registered_address, name, value),
            "website" => assign_text(&mut self.website, name, value),
            "contactEmail" => assign_text(&mut self.contact_email, name, value),
            "contactPhone" => assign_text(&mut self.contact_phone, name, value),
            _ => Err(unknown_field(self.id().as_str(), name)),
        }
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check(
            &mut errors,
            "companyName",
            validate_required("Company name", &self.company_name),
        );
        check(
            &mut errors,
            "tradeLicenseNumber",
            validate_required("Trade licence number", &self.trade_license_number),
        );
        check(
            &mut errors,
            "licenseExpiryDate",
            validate_iso_date(&self.license_expiry_date).map(|_| ()),
        );
        check(
            &mut errors,
            "registeredAddress",
            validate_required("Registered address", &self.registered_address),
        );
        if !self.website.trim().is_empty() {
            check(&mut errors, "website", validate_website(&self.website));
        }
        check(&mut errors, "contactEmail", validate_email(&self.contact_email));
        check(&mut errors, "contactPhone", validate_phone(&self.contact_phone));
        require_document(
            &mut errors,
            "tradeLicenseFile",
            "Trade licence copy",
            &self.trade_license_file,
        );

        if self.shareholders.is_empty() {
            errors.insert(
                "shareholders".to_string(),
                "Add at least one shareholder".to_string(),
            );
        }
        let mut total_pct = 0.0_f64;
        for (i, s) in self.shareholders.iter().enumerate() {
            check(
                &mut errors,
                format!("shareholders[{}].name", i),
                validate_required("Name", &s.name),
            );
            let pct = format!("shareholders[{}].ownershipPercentage", i);
            match validate_percentage(&s.ownership_percentage) {
                Ok(()) => {
                    total_pct += s
                        .ownership_percentage
                        .trim()
                        .trim_end_matches('%')
                        .trim()
                        .parse::<f64>()
                        .unwrap_or(0.0);
                }
                Err(msg) => {
                    errors.insert(pct, msg);
                }
            }
        }
        if total_pct > 100.0 + f64::EPSILON {
            errors.insert(
                "shareholders".to_string(),
                "Shareholdings add up to more than 100%".to_string(),
            );
        }

        for (i, u) in self.ubos.iter().enumerate() {
            check(
                &mut errors,
                format!("ubos[{}].name", i),
                validate_required("Name", &u.name),
            );
            check(
                &mut errors,
                format!("ubos[{}].ownershipPercentage", i),
                validate_percentage(&u.ownership_percentage),
            );
            require_document(
                &mut errors,
                &format!("ubos[{}].{}", i, RepeatingList::Ubos.document_key()),
                "ID copy",
                &u.id_document,
            );
        }

        if self.directors.is_empty() {
            errors.insert(
                "directors".to_string(),
                "Add at least one director".to_string(),
            );
        }
        for (i, d) in self.directors.iter().enumerate() {
            check(
                &mut errors,
                format!("directors[{}].name", i),
                validate_required("Name", &d.name),
            );
            check(
                &mut errors,
                format!("directors[{}].position", i),
                validate_required("Position", &d.position),
            );
        }
        errors
    }

    fn document_specs(&self) -> &'static [DocumentSpec] {
        const DOCS: &[DocumentSpec] = &[
            DocumentSpec {
                key: "tradeLicenseFile",
                label: "Trade licence copy",
                gated_by: None,
            },
            DocumentSpec {
                key: "articlesOfAssociation",
                label: "Articles of association",
                gated_by: None,
            },
        ];
        DOCS
    }

    fn document_field(&self, key: &str) -> Option<&DocumentRef> {
        match key {
            "tradeLicenseFile" => Some(&self.trade_license_file),
            "articlesOfAssociation" => Some(&self.articles_of_association),
            _ => None,
        }
    }

    fn document_field_mut(&mut self, key: &str) -> Option<&mut DocumentRef> {
        match key {
            "tradeLicenseFile" => Some(&mut self.trade_license_file),
            "articlesOfAssociation" => Some(&mut self.articles_of_association),
            _ => None,
        }
    }

    fn lists(&self) -> &'static [RepeatingList] {
        &[
            RepeatingList::Shareholders,
            RepeatingList::Ubos,
            RepeatingList::Directors,
        ]
    }

    fn list(&self, list: RepeatingList) -> Option<&dyn ListAccess> {
        let items: &dyn ListAccess = match list {
            RepeatingList::Shareholders => &self.shareholders,
            RepeatingList::Ubos => &self.ubos,
            RepeatingList::Directors => &self.directors,
        };
        Some(items)
    }

    fn list_mut(&mut self, list: RepeatingList) -> Option<&mut dyn ListAccess> {
        let items: &mut dyn ListAccess = match list {
            RepeatingList::Shareholders => &mut self.shareholders,
            RepeatingList::Ubos => &mut self.ubos,
            RepeatingList::Directors => &mut self.directors,
        };
        Some(items)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinancialThresholds {
    pub annual_turnover: String,
    pub bullion_turnover_exceeds_threshold: Option<YesNo>,
    pub bullion_turnover_proof: DocumentRef,
    pub cash_transactions_above_threshold: Option<YesNo>,
    pub cash_transactions_details: String,
    pub audited_financial_statements: DocumentRef,
}

impl SectionSchema for FinancialThresholds {
    fn id(&self) -> SectionId {
        SectionId::FinancialThresholds
    }

    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::text("annualTurnover", "Annual turnover (AED)"),
            FieldSpec::yes_no(
                "bullionTurnoverExceedsThreshold",
                "Bullion turnover above the membership threshold?",
            ),
            FieldSpec::yes_no(
                "cashTransactionsAboveThreshold",
                "Cash transactions above the reporting threshold?",
            ),
            FieldSpec::text("cashTransactionsDetails", "Cash transaction details")
                .gated("cashTransactionsAboveThreshold"),
        ];
        FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "annualTurnover" => text(&self.annual_turnover),
            "bullionTurnoverExceedsThreshold" => {
                Some(FieldValue::YesNo(self.bullion_turnover_exceeds_threshold))
            }
            "cashTransactionsAboveThreshold" => {
                Some(FieldValue::YesNo(self.cash_transactions_above_threshold))
            }
            "cashTransactionsDetails" => text(&self.cash_transactions_details),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        match name {
            "annualTurnover" => assign_text(&mut self.annual_turnover, name, value),
            "bullionTurnoverExceedsThreshold" => {
                assign_yes_no(&mut self.bullion_turnover_exceeds_threshold, name, value)
            }
            "cashTransactionsAboveThreshold" => {
                assign_yes_no(&mut self.cash_transactions_above_threshold, name, value)
            }
            "cashTransactionsDetails" => {
                assign_text(&mut self.cash_transactions_details, name, value)
            }
            _ => Err(unknown_field(self.id().as_str(), name)),
        }
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check(
            &mut errors,
            "annualTurnover",
            validate_amount("Annual turnover", &self.annual_turnover),
        );
        require_answer(
            &mut errors,
            "bullionTurnoverExceedsThreshold",
            self.bullion_turnover_exceeds_threshold,
        );
        if self.bullion_turnover_exceeds_threshold == Some(YesNo::Yes) {
            require_document(
                &mut errors,
                "bullionTurnoverProof",
                "Proof of bullion turnover",
                &self.bullion_turnover_proof,
            );
        }
        require_answer(
            &mut errors,
            "cashTransactionsAboveThreshold",
            self.cash_transactions_above_threshold,
        );
        if self.cash_transactions_above_threshold == Some(YesNo::Yes) {
            check(
                &mut errors,
                "cashTransactionsDetails",
                validate_required("Cash transaction details", &self.cash_transactions_details),
            );
        }
        require_document(
            &mut errors,
            "auditedFinancialStatements",
            "Audited financial statements",
            &self.audited_financial_statements,
        );
        errors
    }

    fn document_specs(&self) -> &'static [DocumentSpec] {
        const DOCS: &[DocumentSpec] = &[
            DocumentSpec {
                key: "bullionTurnoverProof",
                label: "Proof of bullion turnover",
                gated_by: Some("bullionTurnoverExceedsThreshold"),
            },
            DocumentSpec {
                key: "auditedFinancialStatements",
                label: "Audited financial statements",
                gated_by: None,
            },
        ];
        DOCS
    }

    fn document_field(&self, key: &str) -> Option<&DocumentRef> {
        match key {
            "bullionTurnoverProof" => Some(&self.bullion_turnover_proof),
            "auditedFinancialStatements" => Some(&self.audited_financial_statements),
            _ => None,
        }
    }

    fn document_field_mut(&mut self, key: &str) -> Option<&mut DocumentRef> {
        match key {
            "bullionTurnoverProof" => Some(&mut self.bullion_turnover_proof),
            "auditedFinancialStatements" => Some(&mut self.audited_financial_statements),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataProtectionPrivacy {
    pub has_privacy_policy: Option<YesNo>,
    pub privacy_policy_document: DocumentRef,
    pub dpo_name: String,
    pub dpo_email: String,
    pub data_breach_last_three_years: Option<YesNo>,
    pub data_breach_details: String,
}

impl SectionSchema for DataProtectionPrivacy {
    fn id(&self) -> SectionId {
        SectionId::DataProtectionPrivacy
    }

    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::yes_no("hasPrivacyPolicy", "Documented privacy policy in place?"),
            FieldSpec::text("dpoName", "Data protection officer"),
            FieldSpec::text("dpoEmail", "DPO email"),
            FieldSpec::yes_no(
                "dataBreachLastThreeYears",
                "Any data breach in the last three years?",
            ),
            FieldSpec::text("dataBreachDetails", "Breach details")
                .gated("dataBreachLastThreeYears"),
        ];
        FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "hasPrivacyPolicy" => Some(FieldValue::YesNo(self.has_privacy_policy)),
            "dpoName" => text(&self.dpo_name),
            "dpoEmail" => text(&self.dpo_email),
            "dataBreachLastThreeYears" => Some(FieldValue::YesNo(self.data_breach_last_three_years)),
            "dataBreachDetails" => text(&self.data_breach_details),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        match name {
            "hasPrivacyPolicy" => assign_yes_no(&mut self.has_privacy_policy, name, value),
            "dpoName" => assign_text(&mut self.dpo_name, name, value),
            "dpoEmail" => assign_text(&mut self.dpo_email, name, value),
            "dataBreachLastThreeYears" => {
                assign_yes_no(&mut self.data_breach_last_three_years, name, value)
            }
            "dataBreachDetails" => assign_text(&mut self.data_breach_details, name, value),
            _ => Err(unknown_field(self.id().as_str(), name)),
        }
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        require_answer(&mut errors, "hasPrivacyPolicy", self.has_privacy_policy);
        if self.has_privacy_policy == Some(YesNo::Yes) {
            require_document(
                &mut errors,
                "privacyPolicyDocument",
                "Privacy policy",
                &self.privacy_policy_document,
            );
        }
        check(
            &mut errors,
            "dpoName",
            validate_required("Data protection officer", &self.dpo_name),
        );
        check(&mut errors, "dpoEmail", validate_email(&self.dpo_email));
        require_answer(
            &mut errors,
            "dataBreachLastThreeYears",
            self.data_breach_last_three_years,
        );
        if self.data_breach_last_three_years == Some(YesNo::Yes) {
            check(
                &mut errors,
                "dataBreachDetails",
                validate_required("Breach details", &self.data_breach_details),
            );
        }
        errors
    }

    fn document_specs(&self) -> &'static [DocumentSpec] {
        const DOCS: &[DocumentSpec] = &[DocumentSpec {
            key: "privacyPolicyDocument",
            label: "Privacy policy",
            gated_by: Some("hasPrivacyPolicy"),
        }];
        DOCS
    }

    fn document_field(&self, key: &str) -> Option<&DocumentRef> {
        (key == "privacyPolicyDocument").then_some(&self.privacy_policy_document)
    }

    fn document_field_mut(&mut self, key: &str) -> Option<&mut DocumentRef> {
        (key == "privacyPolicyDocument").then_some(&mut self.privacy_policy_document)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComplianceDeclarations {
    pub compliance_officer_name: String,
    pub compliance_officer_email: String,
    pub aml_policy_document: DocumentRef,
    pub sanctions_screening: Option<YesNo>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub declaration_accepted: bool,
}

impl SectionSchema for ComplianceDeclarations {
    fn id(&self) -> SectionId {
        SectionId::ComplianceDeclarations
    }

    fn fields(&self) -> &'static [FieldSpec] {
        const FIELDS: &[FieldSpec] = &[
            FieldSpec::text("complianceOfficerName", "Compliance officer"),
            FieldSpec::text("complianceOfficerEmail", "Compliance officer email"),
            FieldSpec::yes_no(
                "sanctionsScreening",
                "Customers screened against sanctions lists?",
            ),
            FieldSpec::checkbox(
                "declarationAccepted",
                "I declare the information provided is true and complete",
            ),
        ];
        FIELDS
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "complianceOfficerName" => text(&self.compliance_officer_name),
            "complianceOfficerEmail" => text(&self.compliance_officer_email),
            "sanctionsScreening" => Some(FieldValue::YesNo(self.sanctions_screening)),
            "declarationAccepted" => Some(FieldValue::Checked(self.declaration_accepted)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        match name {
            "complianceOfficerName" => assign_text(&mut self.compliance_officer_name, name, value),
            "complianceOfficerEmail" => {
                assign_text(&mut self.compliance_officer_email, name, value)
            }
            "sanctionsScreening" => assign_yes_no(&mut self.sanctions_screening, name, value),
            "declarationAccepted" => assign_checked(&mut self.declaration_accepted, name, value),
            _ => Err(unknown_field(self.id().as_str(), name)),
        }
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check(
            &mut errors,
            "complianceOfficerName",
            validate_required("Compliance officer", &self.compliance_officer_name),
        );
        check(
            &mut errors,
            "complianceOfficerEmail",
            validate_email(&self.compliance_officer_email),
        );
        require_document(
            &mut errors,
            "amlPolicyDocument",
            "AML policy",
            &self.aml_policy_document,
        );
        require_answer(&mut errors, "sanctionsScreening", self.sanctions_screening);
        if !self.declaration_accepted {
            errors.insert(
                "declarationAccepted".to_string(),
                "You must accept the declaration".to_string(),
            );
        }
        errors
    }

    fn document_specs(&self) -> &'static [DocumentSpec] {
        const DOCS: &[DocumentSpec] = &[DocumentSpec {
            key: "amlPolicyDocument",
            label: "AML / CFT policy",
            gated_by: None,
        }];
        DOCS
    }

    fn document_field(&self, key: &str) -> Option<&DocumentRef> {
        (key == "amlPolicyDocument").then_some(&self.aml_policy_document)
    }

    fn document_field_mut(&mut self, key: &str) -> Option<&mut DocumentRef> {
        (key == "amlPolicyDocument").then_some(&mut self.aml_policy_document)
    }
}

pub const SUPPORTING_DOCUMENTS_MAX: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupportingDocuments {
    pub additional_documents: Vec<DocumentRef>,
}

impl SectionSchema for SupportingDocuments {
    fn id(&self) -> SectionId {
        SectionId::SupportingDocuments
    }

    fn fields(&self) -> &'static [FieldSpec] {
        &[]
    }

    fn field(&self, _name: &str) -> Option<FieldValue> {
        None
    }

    fn set_field(&mut self, name: &str, _value: FieldValue) -> Result<(), SectionError> {
        Err(unknown_field(self.id().as_str(), name))
    }

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.additional_documents.len() > SUPPORTING_DOCUMENTS_MAX {
            errors.insert(
                "additionalDocuments".to_string(),
                format!("At most {} documents may be attached", SUPPORTING_DOCUMENTS_MAX),
            );
        }
        errors
    }

    fn multi_document_specs(&self) -> &'static [MultiDocumentSpec] {
        const MULTI: &[MultiDocumentSpec] = &[MultiDocumentSpec {
            key: "additionalDocuments",
            label: "Additional documents",
            max_files: SUPPORTING_DOCUMENTS_MAX,
        }];
        MULTI
    }

    fn multi_documents(&self, key: &str) -> Option<&Vec<DocumentRef>> {
        (key == "additionalDocuments").then_some(&self.additional_documents)
    }

    fn multi_documents_mut(&mut self, key: &str) -> Option<&mut Vec<DocumentRef>> {
        (key == "additionalDocuments").then_some(&mut self.additional_documents)
    }
}

// =========================
// Tagged section data
// =========================

/// One section's data, tagged by its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sectionId", content = "data", rename_all = "camelCase")]
pub enum SectionData {
    CompanyDetails(CompanyDetails),
    FinancialThresholds(FinancialThresholds),
    DataProtectionPrivacy(DataProtectionPrivacy),
    ComplianceDeclarations(ComplianceDeclarations),
    SupportingDocuments(SupportingDocuments),
}

impl SectionData {
    /// Empty (default-valued) data for a section.
    pub fn empty(id: SectionId) -> Self {
        match id {
            SectionId::CompanyDetails => SectionData::CompanyDetails(CompanyDetails::default()),
            SectionId::FinancialThresholds => {
                SectionData::FinancialThresholds(FinancialThresholds::default())
            }
            SectionId::DataProtectionPrivacy => {
                SectionData::DataProtectionPrivacy(DataProtectionPrivacy::default())
            }
            SectionId::ComplianceDeclarations => {
                SectionData::ComplianceDeclarations(ComplianceDeclarations::default())
            }
            SectionId::SupportingDocuments => {
                SectionData::SupportingDocuments(SupportingDocuments::default())
            }
        }
    }

    /// Coerce a server payload into the section's schema.
    ///
    /// Nulls fall back to defaults and numeric scalars are accepted for text fields.
    pub fn from_payload(id: SectionId, payload: Value) -> Result<Self, SectionError> {
        if !payload.is_object() {
            return Err(SectionError::Payload {
                section: id,
                message: "expected a JSON object".to_string(),
            });
        }
        let normalized = normalize_payload(payload, None);
        let map_err = |e: serde_json::Error| SectionError::Payload {
            section: id,
            message: e.to_string(),
        };
        Ok(match id {
            SectionId::CompanyDetails => {
                SectionData::CompanyDetails(serde_json::from_value(normalized).map_err(map_err)?)
            }
            SectionId::FinancialThresholds => SectionData::FinancialThresholds(
                serde_json::from_value(normalized).map_err(map_err)?,
            ),
            SectionId::DataProtectionPrivacy => SectionData::DataProtectionPrivacy(
                serde_json::from_value(normalized).map_err(map_err)?,
            ),
            SectionId::ComplianceDeclarations => SectionData::ComplianceDeclarations(
                serde_json::from_value(normalized).map_err(map_err)?,
            ),
            SectionId::SupportingDocuments => SectionData::SupportingDocuments(
                serde_json::from_value(normalized).map_err(map_err)?,
            ),
        })
    }

    /// The untagged section body sent to the backend.
    pub fn payload(&self) -> Result<Value, SectionError> {
        let result = match self {
            SectionData::CompanyDetails(s) => serde_json::to_value(s),
            SectionData::FinancialThresholds(s) => serde_json::to_value(s),
            SectionData::DataProtectionPrivacy(s) => serde_json::to_value(s),
            SectionData::ComplianceDeclarations(s) => serde_json::to_value(s),
            SectionData::SupportingDocuments(s) => serde_json::to_value(s),
        };
        result.map_err(|e| SectionError::Payload {
            section: self.id(),
            message: e.to_string(),
        })
    }

    fn schema(&self) -> &dyn SectionSchema {
        match self {
            SectionData::CompanyDetails(s) => s,
            SectionData::FinancialThresholds(s) => s,
            SectionData::DataProtectionPrivacy(s) => s,
            SectionData::ComplianceDeclarations(s) => s,
            SectionData::SupportingDocuments(s) => s,
        }
    }

    fn schema_mut(&mut self) -> &mut dyn SectionSchema {
        match self {
            SectionData::CompanyDetails(s) => s,
            SectionData::FinancialThresholds(s) => s,
            SectionData::DataProtectionPrivacy(s) => s,
            SectionData::ComplianceDeclarations(s) => s,
            SectionData::SupportingDocuments(s) => s,
        }
    }

    pub fn id(&self) -> SectionId {
        self.schema().id()
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.schema().fields()
    }

    pub fn document_specs(&self) -> &'static [DocumentSpec] {
        self.schema().document_specs()
    }

    pub fn multi_document_specs(&self) -> &'static [MultiDocumentSpec] {
        self.schema().multi_document_specs()
    }

    pub fn lists(&self) -> &'static [RepeatingList] {
        self.schema().lists()
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.schema().field(name)
    }

    /// Assign one scalar field. Answering a Yes/No gate with anything but `Yes`
    /// drops staged (not yet uploaded) files of the attachments it controls;
    /// persisted references stay until the section is saved.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SectionError> {
        if let Some(gate) = self.gate_of(name) {
            if !self.gate_open(gate) {
                return Err(SectionError::FieldDisabled {
                    field: name.to_string(),
                });
            }
        }
        let closes_gate = matches!(&value, FieldValue::YesNo(v) if *v != Some(YesNo::Yes));
        self.schema_mut().set_field(name, value)?;

        if closes_gate {
            let gated: Vec<&'static str> = self
                .document_specs()
                .iter()
                .filter(|d| d.gated_by == Some(name))
                .map(|d| d.key)
                .collect();
            for key in gated {
                if let Some(doc) = self.schema_mut().document_field_mut(key) {
                    doc.clear_staged();
                }
            }
        }
        Ok(())
    }

    fn gate_of(&self, name: &str) -> Option<&'static str> {
        self.fields()
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.gated_by)
            .or_else(|| {
                self.document_specs()
                    .iter()
                    .find(|d| d.key == name)
                    .and_then(|d| d.gated_by)
            })
    }

    fn gate_open(&self, gate: &str) -> bool {
        matches!(self.field(gate), Some(FieldValue::YesNo(Some(YesNo::Yes))))
    }

    /// A field or attachment is enabled unless its Yes/No gate is not answered `Yes`.
    pub fn is_enabled(&self, name: &str) -> bool {
        match self.gate_of(name) {
            Some(gate) => self.gate_open(gate),
            None => true,
        }
    }

    pub fn validate(&self) -> FieldErrors {
        self.schema().validate()
    }

    // ---- repeating lists ----

    pub fn list_len(&self, list: RepeatingList) -> Result<usize, SectionError> {
        self.schema()
            .list(list)
            .map(|l| l.len())
            .ok_or(SectionError::UnsupportedList {
                section: self.id(),
                list,
            })
    }

    fn list_mut(&mut self, list: RepeatingList) -> Result<&mut dyn ListAccess, SectionError> {
        let section = self.id();
        self.schema_mut()
            .list_mut(list)
            .ok_or(SectionError::UnsupportedList { section, list })
    }

    fn check_index(&self, list: RepeatingList, index: usize) -> Result<(), SectionError> {
        let len = self.list_len(list)?;
        if index >= len {
            return Err(SectionError::IndexOutOfRange { list, index, len });
        }
        Ok(())
    }

    /// Append a default record; returns its index.
    pub fn add_item(&mut self, list: RepeatingList) -> Result<usize, SectionError> {
        Ok(self.list_mut(list)?.push_default())
    }

    /// Remove by index (later items shift down); returns the removed record's attachment.
    pub fn remove_item(
        &mut self,
        list: RepeatingList,
        index: usize,
    ) -> Result<DocumentRef, SectionError> {
        self.check_index(list, index)?;
        Ok(self.list_mut(list)?.remove(index))
    }

    pub fn item_field(
        &self,
        list: RepeatingList,
        index: usize,
        name: &str,
    ) -> Result<FieldValue, SectionError> {
        self.check_index(list, index)?;
        self.schema()
            .list(list)
            .and_then(|l| l.field(index, name))
            .ok_or_else(|| unknown_field(list.key(), name))
    }

    pub fn set_item_field(
        &mut self,
        list: RepeatingList,
        index: usize,
        name: &str,
        value: FieldValue,
    ) -> Result<(), SectionError> {
        self.check_index(list, index)?;
        self.list_mut(list)?.set_field(index, name, value)
    }

    // ---- attachments ----

    pub fn document(&self, slot: &DocumentSlot) -> Option<&DocumentRef> {
        match slot {
            DocumentSlot::Field(key) => self.schema().document_field(key),
            DocumentSlot::Item { list, index } => {
                self.schema().list(*list).and_then(|l| l.document(*index))
            }
        }
    }

    pub fn document_mut(&mut self, slot: &DocumentSlot) -> Result<&mut DocumentRef, SectionError> {
        let section = self.id();
        let found = match slot {
            DocumentSlot::Field(key) => self.schema_mut().document_field_mut(key),
            DocumentSlot::Item { list, index } => self
                .schema_mut()
                .list_mut(*list)
                .and_then(|l| l.document_mut(*index)),
        };
        found.ok_or_else(|| SectionError::UnknownDocumentSlot {
            section,
            slot: slot.to_string(),
        })
    }

    /// Every single-file slot, including one per repeating record.
    pub fn document_slots(&self) -> Vec<DocumentSlot> {
        let mut slots: Vec<DocumentSlot> = self
            .document_specs()
            .iter()
            .map(|d| DocumentSlot::field(d.key))
            .collect();
        for list in self.lists() {
            let len = self.list_len(*list).unwrap_or(0);
            slots.extend((0..len).map(|index| DocumentSlot::Item { list: *list, index }));
        }
        slots
    }

    /// Slots currently holding a staged (not yet uploaded) file.
    pub fn staged_files(&self) -> Vec<(DocumentSlot, StagedFile)> {
        self.document_slots()
            .into_iter()
            .filter_map(|slot| {
                let file = self.document(&slot)?.local_file.clone()?;
                Some((slot, file))
            })
            .collect()
    }

    pub fn multi_documents(&self, key: &str) -> Option<&Vec<DocumentRef>> {
        self.schema().multi_documents(key)
    }

    pub fn multi_documents_mut(&mut self, key: &str) -> Result<&mut Vec<DocumentRef>, SectionError> {
        let section = self.id();
        self.schema_mut()
            .multi_documents_mut(key)
            .ok_or_else(|| SectionError::UnknownDocumentSlot {
                section,
                slot: key.to_string(),
            })
    }

    /// Copy of the data as it should be submitted: values behind a closed
    /// Yes/No gate are blanked (text emptied, attachment references dropped).
    pub fn submission(&self) -> SectionData {
        let mut out = self.clone();
        for spec in self.fields() {
            if spec.kind == FieldKind::Text && !self.is_enabled(spec.name) {
                let _ = out
                    .schema_mut()
                    .set_field(spec.name, FieldValue::Text(String::new()));
            }
        }
        for spec in self.document_specs() {
            if !self.is_enabled(spec.key) {
                if let Some(doc) = out.schema_mut().document_field_mut(spec.key) {
                    *doc = DocumentRef::default();
                }
            }
        }
        out
    }
}

/// Drop nulls (so defaults apply) and stringify numbers, except document ids.
/// Checkbox and id fields accept either shape when decoded.
fn normalize_payload(value: Value, key: Option<&str>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let v = normalize_payload(v, Some(k.as_str()));
                    (k, v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(|v| normalize_payload(v, key))
                .collect(),
        ),
        Value::Number(n) if key != Some("documentId") => Value::String(n.to_string()),
        other => other,
    }
}
