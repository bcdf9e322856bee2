//! Statement model for the target repository
//!
//! Statements are pure data: a target property, a value, qualifier and
//! reference sets, and a rank. They know nothing about the record they
//! will be merged into; the merge engine reconciles them against
//! [`ExistingClaim`]s read from the target.

use serde::{Deserialize, Serialize};

// ============================================================================
// Property and entity constants (knowledge-base vocabulary)
// ============================================================================

/// External page identifier (BHL page ID)
pub const P_BHL_PAGE_ID: &str = "P687";
/// Publication linkage (published in)
pub const P_PUBLISHED_IN: &str = "P1433";
/// Holding institution (collection)
pub const P_COLLECTION: &str = "P195";
/// Digitization sponsor
pub const P_SPONSOR: &str = "P859";
/// Creator
pub const P_CREATOR: &str = "P170";
/// Inception
pub const P_INCEPTION: &str = "P571";
/// Depicted taxon
pub const P_DEPICTS: &str = "P180";
/// Work type (instance of)
pub const P_INSTANCE_OF: &str = "P31";
/// Copyright status
pub const P_COPYRIGHT_STATUS: &str = "P6216";
/// Copyright license (clearance claims superseded with copyright status)
pub const P_LICENSE: &str = "P275";
/// Photo-sharing identifier (Flickr photo ID)
pub const P_FLICKR_ID: &str = "P12120";

/// Qualifier: applies to part
pub const P_APPLIES_TO_PART: &str = "P518";
/// Qualifier: object has role
pub const P_OBJECT_HAS_ROLE: &str = "P3831";
/// Qualifier: sourcing circumstances
pub const P_SOURCING_CIRCUMSTANCES: &str = "P1480";
/// Reference: based on heuristic
pub const P_BASED_ON_HEURISTIC: &str = "P887";
/// Reference: locator URL
pub const P_REFERENCE_URL: &str = "P854";

/// Analog work (applies-to-part qualifier value)
pub const Q_ANALOG_WORK: &str = "Q112134971";
/// No later than (sourcing circumstances for inception)
pub const Q_NO_LATER_THAN: &str = "Q110290992";
/// Role: illustrator
pub const Q_ROLE_ILLUSTRATOR: &str = "Q644687";
/// Role: engraver
pub const Q_ROLE_ENGRAVER: &str = "Q329439";
/// Role: lithographer
pub const Q_ROLE_LITHOGRAPHER: &str = "Q16947657";
/// Role: painter
pub const Q_ROLE_PAINTER: &str = "Q1028181";
/// Role: holding institution
pub const Q_ROLE_HOLDING_INSTITUTION: &str = "Q131597993";
/// Role: digitization sponsor
pub const Q_ROLE_DIGITIZATION_SPONSOR: &str = "Q131344184";

/// Work type: illustration
pub const Q_ILLUSTRATION: &str = "Q178659";
/// Work type: map
pub const Q_MAP: &str = "Q4006";
/// Work type: title page
pub const Q_TITLE_PAGE: &str = "Q1339862";
/// Work type: table of contents
pub const Q_TABLE_OF_CONTENTS: &str = "Q1456936";
/// Work type: foldout
pub const Q_FOLDOUT: &str = "Q2649400";

/// Copyright status: public domain
pub const Q_PUBLIC_DOMAIN: &str = "Q19652";
/// Copyright status: copyrighted
pub const Q_COPYRIGHTED: &str = "Q50423863";

// ============================================================================
// Provenance
// ============================================================================

/// Inference strategy recorded on every synthesized statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Derived from OCR-recognized page content
    OcrInferred,
    /// Derived from a photo-sharing tag
    TagInferred,
    /// Derived from the publication date of the containing title
    PublicationDateInferred,
}

impl Provenance {
    /// Knowledge-base entity recorded as the heuristic reference value
    pub fn entity(&self) -> &'static str {
        match self {
            Provenance::OcrInferred => "Q131783016",
            Provenance::TagInferred => "Q131782980",
            Provenance::PublicationDateInferred => "Q110393725",
        }
    }
}

/// Reference set entry: provenance strategy plus a locator URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Inference heuristic that produced the statement
    pub heuristic: Option<Provenance>,
    /// Locator URL enabling downstream audit
    pub url: Option<String>,
}

/// Qualifier: property + entity value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qualifier {
    pub property: String,
    pub value: String,
}

// ============================================================================
// Statements
// ============================================================================

/// Statement rank distinguishing primary from secondary claims
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rank {
    Preferred,
    #[default]
    Normal,
}

/// Typed statement value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementValue {
    /// Knowledge-base entity id
    Entity(String),
    /// External identifier string
    ExternalId(String),
    /// Year with year precision
    Year(String),
    /// Plain URL value
    Url(String),
    /// Documented absence ("unknown value" snak)
    SomeValue,
}

impl StatementValue {
    /// Field-specific equivalence used for de-duplication.
    ///
    /// Year values compare by year string regardless of any richer time
    /// representation on the target; everything else compares exactly.
    pub fn equivalent(&self, other: &StatementValue) -> bool {
        match (self, other) {
            (StatementValue::Year(a), StatementValue::Year(b)) => a == b,
            (a, b) => a == b,
        }
    }
}

/// A synthesized statement destined for a target record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub property: String,
    pub value: StatementValue,
    #[serde(default)]
    pub qualifiers: Vec<Qualifier>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub rank: Rank,
}

impl Statement {
    pub fn new(property: &str, value: StatementValue) -> Self {
        Self {
            property: property.to_string(),
            value,
            qualifiers: Vec::new(),
            references: Vec::new(),
            rank: Rank::Normal,
        }
    }

    pub fn with_qualifier(mut self, property: &str, value: &str) -> Self {
        self.qualifiers.push(Qualifier {
            property: property.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_reference(mut self, heuristic: Option<Provenance>, url: Option<String>) -> Self {
        self.references.push(Reference { heuristic, url });
        self
    }

    pub fn with_rank(mut self, rank: Rank) -> Self {
        self.rank = rank;
        self
    }

    /// Property + value equivalence against an existing claim
    pub fn matches(&self, existing: &ExistingClaim) -> bool {
        self.property == existing.property && self.value.equivalent(&existing.value)
    }
}

/// A claim already present on a target record (read-only input)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingClaim {
    pub property: String,
    pub value: StatementValue,
    /// Target-side claim id, required to retract the claim
    #[serde(default)]
    pub id: Option<String>,
}

impl ExistingClaim {
    pub fn new(property: &str, value: StatementValue) -> Self {
        Self {
            property: property.to_string(),
            value,
            id: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

// ============================================================================
// Merge policy and write batches
// ============================================================================

/// Write reconciliation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Add unless an equivalent property+value claim already exists
    MergeOrAppend,
    /// Supersede conflicting prior values on the property
    ReplaceAll,
}

/// Reconciled batch produced by the merge engine for one target record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    /// Statements to add
    pub additions: Vec<Statement>,
    /// Existing claims to retract before adding
    pub retractions: Vec<ExistingClaim>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.retractions.is_empty()
    }
}
