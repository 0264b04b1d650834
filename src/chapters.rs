//! Static chapter reference data. Loaded once as a fixed table; records
//! are never created or destroyed at runtime. Lookup is by
//! case-insensitive display-name match.

use once_cell::sync::Lazy;
use serde::Serialize;

/// Vendor-specific reference ids for one chapter.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterRecord {
    pub display_name: &'static str,
    /// SKY constituent id for the chapter's organization record.
    pub constituent_id: &'static str,
    /// Prefix stamped onto member record ids, e.g. "MT" for Mu Tau.
    pub record_prefix: &'static str,
    /// Id of the financial entity that receives the chapter's fees.
    pub financial_entity_id: &'static str,
    /// Unique id of the chapter's saved roster query.
    pub query_unique_id: &'static str,
    /// Membership category id used when promoting members.
    pub membership_category_id: &'static str,
}

static CHAPTERS: Lazy<Vec<ChapterRecord>> = Lazy::new(|| {
    vec![
        chapter("Alpha Rho", "281634", "AR", "18", "b9c2f241-0cd8-4a0e-a176-4d33bb1a11d1", "41"),
        chapter("Beta Theta", "281718", "BT", "19", "6f1d5a02-98c3-4a57-b0fe-72c0ad10b902", "42"),
        chapter("Gamma Chi", "281802", "GC", "20", "2a78f4be-6de1-4f3a-9c05-9a41bd2d2203", "43"),
        chapter("Delta Nu", "281967", "DN", "21", "c41b8d77-3f92-4716-8df2-57f0be9f3304", "44"),
        chapter("Epsilon Phi", "282044", "EP", "22", "8d30a1c5-ee07-45d9-bb14-1bb6de744405", "45"),
        chapter("Zeta Psi", "282131", "ZP", "23", "0f66cc29-71ab-4f20-95d3-fa2e60d8a506", "46"),
        chapter("Kappa Sigma", "282275", "KS", "24", "e5a2417d-20c6-4988-8e6f-330df1cc6607", "47"),
        chapter("Lambda Iota", "282391", "LI", "25", "73c9e8f0-b514-4d6a-a92b-c86a5b1de708", "48"),
        chapter("Mu Tau", "282458", "MT", "26", "4b0dd6a3-57e9-4c31-86d0-2f94ae3fc809", "49"),
        chapter("Omicron Delta", "282570", "OD", "27", "91e7b2c4-0a36-4fd8-bc61-65d87c20090a", "50"),
        chapter("Sigma Omega", "282663", "SO", "28", "af24d91e-83c7-4b05-9e8a-d10c4e76510b", "51"),
        chapter("Upsilon Eta", "282749", "UE", "29", "5c81f06b-49d2-4ea7-8035-7be2910a620c", "52"),
    ]
});

fn chapter(
    display_name: &'static str,
    constituent_id: &'static str,
    record_prefix: &'static str,
    financial_entity_id: &'static str,
    query_unique_id: &'static str,
    membership_category_id: &'static str,
) -> ChapterRecord {
    ChapterRecord {
        display_name,
        constituent_id,
        record_prefix,
        financial_entity_id,
        query_unique_id,
        membership_category_id,
    }
}

/// Case-insensitive lookup by display name.
pub fn get_chapter_data(name: &str) -> Option<&'static ChapterRecord> {
    let wanted = name.trim();
    CHAPTERS
        .iter()
        .find(|c| c.display_name.eq_ignore_ascii_case(wanted))
}

pub fn all_chapters() -> &'static [ChapterRecord] {
    &CHAPTERS
}
