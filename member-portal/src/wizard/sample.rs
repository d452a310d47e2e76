// Sample applicant data for the intake proof run and controller tests.

use std::path::{Path, PathBuf};

use super::{StepError, WizardController};
use crate::hooks::SectionHook;
use crate::models::section::{DocumentSlot, RepeatingList, SectionId};
use crate::widgets::fields::{FieldValue, YesNo};

fn write_pdf(dir: &Path, name: &str) -> Result<PathBuf, StepError> {
    let path = dir.join(name);
    std::fs::write(&path, format!("%PDF-1.4\n% {}\n%%EOF\n", name))
        .map_err(|e| StepError::Document(format!("Could not write {}: {}", path.display(), e)))?;
    Ok(path)
}

fn hook(wizard: &mut WizardController) -> Result<&mut SectionHook, StepError> {
    wizard.current_hook_mut().ok_or(StepError::NotStarted)
}

fn text(wizard: &mut WizardController, name: &str, value: &str) -> Result<(), StepError> {
    hook(wizard)?.set_field(name, FieldValue::text(value))?;
    Ok(())
}

fn answer(wizard: &mut WizardController, name: &str, value: YesNo) -> Result<(), StepError> {
    hook(wizard)?.set_field(name, FieldValue::YesNo(Some(value)))?;
    Ok(())
}

fn attach(
    wizard: &mut WizardController,
    dir: &Path,
    slot: DocumentSlot,
    file_name: &str,
) -> Result<(), StepError> {
    let path = write_pdf(dir, file_name)?;
    wizard.stage_document(slot, &path)?;
    Ok(())
}

fn add_item(
    wizard: &mut WizardController,
    dir: &Path,
    list: RepeatingList,
    fields: &[(&str, &str)],
    file_name: &str,
) -> Result<(), StepError> {
    let h = hook(wizard)?;
    let index = h.add_repeating_item(list)?;
    for (name, value) in fields {
        h.set_repeating_item_field(list, index, name, FieldValue::text(*value))?;
    }
    attach(wizard, dir, DocumentSlot::Item { list, index }, file_name)
}

/// Fill the current step with a complete, valid section. Sample files are written to `dir`.
pub async fn fill_section(
    wizard: &mut WizardController,
    id: SectionId,
    dir: &Path,
) -> Result<(), StepError> {
    if wizard.current_section() != Some(id) {
        return Err(StepError::Document(format!("{} is not the current step", id)));
    }
    match id {
        SectionId::CompanyDetails => {
            text(wizard, "companyName", "Al Noor Bullion Trading LLC")?;
            text(wizard, "tradeLicenseNumber", "DMCC-204518")?;
            text(wizard, "licenseExpiryDate", "2027-03-31")?;
            text(wizard, "registeredAddress", "Unit 1204, Gold Tower, JLT, Dubai")?;
            text(wizard, "website", "alnoorbullion.ae")?;
            text(wizard, "contactEmail", "compliance@alnoorbullion.ae")?;
            text(wizard, "contactPhone", "+971 4 555 0199")?;
            attach(
                wizard,
                dir,
                DocumentSlot::field("tradeLicenseFile"),
                "trade-licence.pdf",
            )?;
            attach(
                wizard,
                dir,
                DocumentSlot::field("articlesOfAssociation"),
                "articles.pdf",
            )?;
            add_item(
                wizard,
                dir,
                RepeatingList::Shareholders,
                &[
                    ("name", "Omar Haddad"),
                    ("nationality", "AE"),
                    ("ownershipPercentage", "60"),
                ],
                "shareholder-1.pdf",
            )?;
            add_item(
                wizard,
                dir,
                RepeatingList::Shareholders,
                &[
                    ("name", "Priya Nair"),
                    ("nationality", "IN"),
                    ("ownershipPercentage", "40"),
                ],
                "shareholder-2.pdf",
            )?;
            add_item(
                wizard,
                dir,
                RepeatingList::Ubos,
                &[
                    ("name", "Omar Haddad"),
                    ("nationality", "AE"),
                    ("ownershipPercentage", "60"),
                ],
                "ubo-passport.pdf",
            )?;
            add_item(
                wizard,
                dir,
                RepeatingList::Directors,
                &[
                    ("name", "Priya Nair"),
                    ("nationality", "IN"),
                    ("position", "Managing Director"),
                ],
                "director-passport.pdf",
            )?;
        }
        SectionId::FinancialThresholds => {
            text(wizard, "annualTurnover", "48,000,000")?;
            answer(wizard, "bullionTurnoverExceedsThreshold", YesNo::Yes)?;
            attach(
                wizard,
                dir,
                DocumentSlot::field("bullionTurnoverProof"),
                "bullion-turnover.pdf",
            )?;
            answer(wizard, "cashTransactionsAboveThreshold", YesNo::No)?;
            attach(
                wizard,
                dir,
                DocumentSlot::field("auditedFinancialStatements"),
                "audited-fs-2025.pdf",
            )?;
        }
        SectionId::DataProtectionPrivacy => {
            answer(wizard, "hasPrivacyPolicy", YesNo::Yes)?;
            attach(
                wizard,
                dir,
                DocumentSlot::field("privacyPolicyDocument"),
                "privacy-policy.pdf",
            )?;
            text(wizard, "dpoName", "Sara Al Mansoori")?;
            text(wizard, "dpoEmail", "dpo@alnoorbullion.ae")?;
            answer(wizard, "dataBreachLastThreeYears", YesNo::No)?;
        }
        SectionId::ComplianceDeclarations => {
            text(wizard, "complianceOfficerName", "Daniel Okafor")?;
            text(wizard, "complianceOfficerEmail", "mlro@alnoorbullion.ae")?;
            attach(
                wizard,
                dir,
                DocumentSlot::field("amlPolicyDocument"),
                "aml-policy.pdf",
            )?;
            answer(wizard, "sanctionsScreening", YesNo::Yes)?;
            hook(wizard)?.set_field("declarationAccepted", FieldValue::Checked(true))?;
        }
        SectionId::SupportingDocuments => {
            let paths = vec![
                write_pdf(dir, "org-chart.pdf")?,
                write_pdf(dir, "bank-reference.pdf")?,
            ];
            let result = wizard.upload_multi("additionalDocuments", &paths).await?;
            if let Some(failure) = result.outcome.failures.first() {
                return Err(StepError::Upload(vec![failure.clone()]));
            }
        }
    }
    Ok(())
}
