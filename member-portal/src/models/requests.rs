// API request models

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::section::{SectionData, SectionError, SectionId};

/// Partial update of one application section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSectionRequest {
    pub section_id: SectionId,
    pub payload: Value,
}

impl SubmitSectionRequest {
    /// Tag the section's submission body (gated-off values already stripped).
    pub fn from_section(data: &SectionData) -> Result<Self, SectionError> {
        Ok(Self {
            section_id: data.id(),
            payload: data.submission().payload()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::fields::{FieldValue, YesNo};

    #[test]
    fn request_is_tagged_with_section_id() {
        let mut data = SectionData::empty(SectionId::DataProtectionPrivacy);
        data.set_field("dpoName", FieldValue::text("R. Sayed")).unwrap();
        data.set_field("hasPrivacyPolicy", FieldValue::YesNo(Some(YesNo::No)))
            .unwrap();

        let req = SubmitSectionRequest::from_section(&data).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["sectionId"], "dataProtectionPrivacy");
        assert_eq!(json["payload"]["dpoName"], "R. Sayed");
        assert_eq!(json["payload"]["hasPrivacyPolicy"], "no");
    }
}
