use crate::license::spdx::classify_spdx_id;
use crate::models::{LicenseExpr, LicenseId, LicenseRisk};

/// Classify a resolved license into a risk level.
///
/// A composite license means the user may pick any member, so the most
/// permissive member decides. An undetermined license is [`LicenseRisk::Unknown`].
pub fn classify(license: Option<&LicenseExpr>) -> LicenseRisk {
    match license {
        None => LicenseRisk::Unknown,
        Some(LicenseExpr::Single(id)) => classify_single(id),
        Some(LicenseExpr::Composite(ids)) => most_permissive(ids.iter().map(classify_single)),
    }
}

fn classify_single(id: &LicenseId) -> LicenseRisk {
    match id {
        LicenseId::Proprietary => LicenseRisk::Proprietary,
        LicenseId::Unknown => LicenseRisk::Unknown,
        other => classify_spdx_id(other.as_spdx()),
    }
}

fn most_permissive(risks: impl Iterator<Item = LicenseRisk>) -> LicenseRisk {
    let risks: Vec<LicenseRisk> = risks.collect();
    [
        LicenseRisk::Permissive,
        LicenseRisk::WeakCopyleft,
        LicenseRisk::StrongCopyleft,
        LicenseRisk::Proprietary,
    ]
    .into_iter()
    .find(|level| risks.contains(level))
    .unwrap_or(LicenseRisk::Unknown)
}
