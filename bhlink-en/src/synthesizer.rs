//! Claim synthesis
//!
//! Turns one enriched [`MetadataRow`] into typed statements, applying
//! the field rules: existing-value suppression, the depicted-taxon rank
//! rule, the sponsor placeholder, strict year validation, and work-type
//! derivation with the illustration year cutoff. Every statement
//! carries a reference set (provenance heuristic and/or locator URL)
//! for downstream audit.

use crate::claims::*;
use crate::types::MetadataRow;
use bhlink_common::config::{CreatorConfig, SynthesisConfig};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A taxon candidate for the depicted-subject field, carrying the
/// inference strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonCandidate {
    pub entity: String,
    pub provenance: Provenance,
}

pub struct ClaimSynthesizer {
    synthesis: SynthesisConfig,
    creators: CreatorConfig,
    institutions: HashMap<String, String>,
    bhl_base_url: String,
}

impl ClaimSynthesizer {
    pub fn new(
        synthesis: SynthesisConfig,
        creators: CreatorConfig,
        institutions: HashMap<String, String>,
        bhl_base_url: &str,
    ) -> Self {
        Self {
            synthesis,
            creators,
            institutions,
            bhl_base_url: bhl_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Synthesize all statements for a row.
    ///
    /// `existing` drives suppression only; reconciliation against the
    /// target record stays with the merge engine.
    pub fn synthesize(
        &self,
        row: &MetadataRow,
        existing: &[ExistingClaim],
        taxa: &[TaxonCandidate],
    ) -> Vec<Statement> {
        let mut statements = Vec::new();

        self.add_work_type(row, existing, &mut statements);
        if !self.synthesis.skip_published_in {
            self.add_publication(row, &mut statements);
        }
        self.add_institution(row, &mut statements);
        self.add_sponsor(row, &mut statements);
        self.add_page_id(row, &mut statements);
        self.add_photo_id(row, &mut statements);
        if !self.synthesis.skip_creators {
            self.add_creators(row, &mut statements);
        }
        self.add_taxa(row, taxa, &mut statements);
        if !self.synthesis.skip_dates {
            self.add_inception(row, &mut statements);
        }
        self.add_copyright(row, &mut statements);

        // Existing-value suppression: equivalence is field-specific
        // (publication link by entity id, inception by year string)
        statements.retain(|statement| {
            let suppressed = existing.iter().any(|claim| statement.matches(claim));
            if suppressed {
                debug!(
                    file = %row.file,
                    property = %statement.property,
                    "Equivalent claim already present, suppressing"
                );
            }
            !suppressed
        });
        statements
    }

    /// Statements produced by the already-enriched short-circuit:
    /// depicted-taxon refresh plus the forced copyright overwrite.
    pub fn synthesize_refresh(
        &self,
        row: &MetadataRow,
        existing: &[ExistingClaim],
        taxa: &[TaxonCandidate],
    ) -> Vec<Statement> {
        let mut statements = Vec::new();
        self.add_taxa(row, taxa, &mut statements);
        self.add_copyright(row, &mut statements);
        statements.retain(|statement| !existing.iter().any(|claim| statement.matches(claim)));
        statements
    }

    // ------------------------------------------------------------------
    // Field rules
    // ------------------------------------------------------------------

    /// Derive the work type from the page-type strings. Only assigned
    /// when the target has no work-type claim at all; the illustration
    /// type is additionally gated on the publication year cutoff.
    fn add_work_type(
        &self,
        row: &MetadataRow,
        existing: &[ExistingClaim],
        statements: &mut Vec<Statement>,
    ) {
        if existing.iter().any(|c| c.property == P_INSTANCE_OF) {
            return;
        }
        let Some(page_types) = row.page_types.as_deref() else {
            return;
        };

        let entity = if page_types.contains("Illustration") {
            match self.publication_year(row) {
                Some(year) if year < self.synthesis.illustration_year_cutoff => Q_ILLUSTRATION,
                _ => return,
            }
        } else if page_types.contains("Map") {
            Q_MAP
        } else if page_types.contains("Title Page") {
            Q_TITLE_PAGE
        } else if page_types.contains("Table of Contents") {
            Q_TABLE_OF_CONTENTS
        } else if page_types.contains("Foldout") {
            Q_FOLDOUT
        } else {
            return;
        };

        statements.push(
            Statement::new(P_INSTANCE_OF, StatementValue::Entity(entity.to_string()))
                .with_reference(Some(Provenance::OcrInferred), Some(self.page_url(row))),
        );
    }

    fn add_publication(&self, row: &MetadataRow, statements: &mut Vec<Statement>) {
        let Some(publication) = nonempty(&row.publication) else {
            return;
        };
        statements.push(
            Statement::new(P_PUBLISHED_IN, StatementValue::Entity(publication))
                .with_qualifier(P_APPLIES_TO_PART, Q_ANALOG_WORK)
                .with_reference(None, self.bibliography_url(row)),
        );
    }

    fn add_institution(&self, row: &MetadataRow, statements: &mut Vec<Statement>) {
        let Some(name) = nonempty(&row.institution) else {
            return;
        };
        let Some(entity) = self.institution_entity(&name) else {
            warn!(file = %row.file, name = %name, "No entity mapping for holding institution, skipping");
            return;
        };
        statements.push(
            Statement::new(P_COLLECTION, StatementValue::Entity(entity))
                .with_qualifier(P_OBJECT_HAS_ROLE, Q_ROLE_HOLDING_INSTITUTION)
                .with_reference(None, self.bibliography_url(row)),
        );
    }

    /// Sponsor entity, or the documented-absence placeholder when the
    /// field is empty and the configuration requires it.
    fn add_sponsor(&self, row: &MetadataRow, statements: &mut Vec<Statement>) {
        let value = match nonempty(&row.sponsor) {
            Some(name) => match self.institution_entity(&name) {
                Some(entity) => StatementValue::Entity(entity),
                None => {
                    warn!(file = %row.file, name = %name, "No entity mapping for sponsor, skipping");
                    return;
                }
            },
            None if self.synthesis.add_missing_sponsor => StatementValue::SomeValue,
            None => return,
        };
        statements.push(
            Statement::new(P_SPONSOR, value)
                .with_qualifier(P_OBJECT_HAS_ROLE, Q_ROLE_DIGITIZATION_SPONSOR)
                .with_reference(None, self.bibliography_url(row)),
        );
    }

    fn add_page_id(&self, row: &MetadataRow, statements: &mut Vec<Statement>) {
        if row.page_id.is_empty() {
            return;
        }
        statements.push(
            Statement::new(P_BHL_PAGE_ID, StatementValue::ExternalId(row.page_id.clone()))
                .with_reference(None, Some(self.page_url(row))),
        );
    }

    fn add_photo_id(&self, row: &MetadataRow, statements: &mut Vec<Statement>) {
        let Some(photo_id) = nonempty(&row.photo_id) else {
            return;
        };
        let url = photo_url(&photo_id);
        statements.push(
            Statement::new(P_FLICKR_ID, StatementValue::ExternalId(photo_id))
                .with_reference(None, Some(url)),
        );
    }

    /// Creator-role statements, gated on the illustration page type.
    fn add_creators(&self, row: &MetadataRow, statements: &mut Vec<Statement>) {
        let is_illustration = row
            .page_types
            .as_deref()
            .is_some_and(|t| t.contains("Illustration"));
        if !is_illustration {
            return;
        }

        let roles = [
            (&row.illustrator, Q_ROLE_ILLUSTRATOR),
            (&row.painter, Q_ROLE_PAINTER),
            (&row.engraver, Q_ROLE_ENGRAVER),
            (&row.lithographer, Q_ROLE_LITHOGRAPHER),
        ];
        for (creator, role) in roles {
            let Some(creator) = nonempty(creator) else {
                continue;
            };
            statements.push(
                Statement::new(P_CREATOR, StatementValue::Entity(creator))
                    .with_qualifier(P_APPLIES_TO_PART, Q_ANALOG_WORK)
                    .with_qualifier(P_OBJECT_HAS_ROLE, role)
                    .with_reference(None, self.creators.reference_url.clone()),
            );
        }
    }

    /// Depicted-taxon statements. Exactly one candidate ranks
    /// preferred; two or more all rank normal.
    fn add_taxa(&self, row: &MetadataRow, taxa: &[TaxonCandidate], statements: &mut Vec<Statement>) {
        let rank = if taxa.len() == 1 {
            Rank::Preferred
        } else {
            Rank::Normal
        };
        for candidate in taxa {
            let url = match candidate.provenance {
                Provenance::TagInferred => nonempty(&row.photo_id).map(|id| photo_url(&id)),
                _ => Some(self.page_url(row)),
            };
            statements.push(
                Statement::new(P_DEPICTS, StatementValue::Entity(candidate.entity.clone()))
                    .with_reference(Some(candidate.provenance), url)
                    .with_rank(rank),
            );
        }
    }

    /// Inception from the title's publication date. The year must be
    /// exactly four digits; anything else is skipped with a warning.
    fn add_inception(&self, row: &MetadataRow, statements: &mut Vec<Statement>) {
        let Some(inception) = nonempty(&row.inception) else {
            return;
        };
        if inception.len() != 4 || !inception.chars().all(|c| c.is_ascii_digit()) {
            warn!(
                file = %row.file,
                inception = %inception,
                "Malformed inception year, skipping field"
            );
            return;
        }
        statements.push(
            Statement::new(P_INCEPTION, StatementValue::Year(inception))
                .with_qualifier(P_SOURCING_CIRCUMSTANCES, Q_NO_LATER_THAN)
                .with_qualifier(P_APPLIES_TO_PART, Q_ANALOG_WORK)
                .with_reference(Some(Provenance::PublicationDateInferred), None),
        );
    }

    fn add_copyright(&self, row: &MetadataRow, statements: &mut Vec<Statement>) {
        let Some(status) = nonempty(&row.copyright_status) else {
            return;
        };
        let entity = match map_copyright_status(&status) {
            Some(entity) => entity,
            None => {
                warn!(file = %row.file, status = %status, "Unrecognized copyright status");
                return;
            }
        };
        statements.push(
            Statement::new(P_COPYRIGHT_STATUS, StatementValue::Entity(entity.to_string()))
                .with_reference(None, Some(self.page_url(row))),
        );
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn page_url(&self, row: &MetadataRow) -> String {
        format!("{}/page/{}", self.bhl_base_url, row.page_id)
    }

    /// Map the free-text institution name the bibliographic API reports
    /// to its knowledge-base entity id. A value that already is an
    /// entity id passes through; an unmapped name yields no claim.
    fn institution_entity(&self, name: &str) -> Option<String> {
        if is_entity_id(name) {
            return Some(name.to_string());
        }
        self.institutions.get(name).cloned()
    }

    fn bibliography_url(&self, row: &MetadataRow) -> Option<String> {
        nonempty(&row.title_id).map(|id| format!("{}/bibliography/{}", self.bhl_base_url, id))
    }

    fn publication_year(&self, row: &MetadataRow) -> Option<u32> {
        nonempty(&row.inception)?.parse().ok()
    }
}

fn photo_url(photo_id: &str) -> String {
    format!("https://www.flickr.com/photo.gne?id={photo_id}")
}

/// Map an archive copyright-status string onto its knowledge-base
/// entity. Unknown wordings map to nothing.
fn map_copyright_status(status: &str) -> Option<&'static str> {
    let status = status.to_ascii_lowercase();
    if status.contains("public domain") || status.contains("not in copyright") {
        Some(Q_PUBLIC_DOMAIN)
    } else if status.contains("in copyright") {
        Some(Q_COPYRIGHTED)
    } else {
        None
    }
}

fn is_entity_id(value: &str) -> bool {
    value
        .strip_prefix('Q')
        .map_or(false, |rest| {
            !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
        })
}

fn nonempty(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

// ============================================================================
// Tests
// ============================================================================
