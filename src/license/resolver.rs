use std::collections::BTreeSet;

use tracing::debug;

use crate::license::spdx::{extract_all, has_multi_license_marker, normalize};
use crate::models::{License, LicenseExpr, LicenseId, LicenseSource};

/// Marker that identifies a license entry in a trove classifier list.
const CLASSIFIER_MARKER: &str = "License ::";

/// Raw license evidence for one package, one field per cascade tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LicenseSources<'a> {
    /// Declared license field of the package metadata.
    pub primary: Option<&'a str>,
    /// SPDX-style license expression field.
    pub expression: Option<&'a str>,
    /// Trove classifiers, e.g. `License :: OSI Approved :: MIT License`.
    pub classifiers: &'a [String],
    /// License reported by the source-control host for the linked repository.
    pub repository: Option<&'a str>,
}

/// Resolve one license verdict from the available sources.
///
/// Tiers are consulted in order (declared field, expression, classifiers,
/// repository) and the first one naming a recognisable license wins. A declared
/// field announcing several licenses ("Dual License: ...") instead collects every
/// license named by the classifiers into a composite, falling back to the
/// licenses the field itself names when no classifier names one.
///
/// `None` means undetermined, not "no license".
pub fn resolve(sources: &LicenseSources<'_>) -> Option<License> {
    let primary = non_blank(sources.primary);

    if let Some(text) = primary {
        if has_multi_license_marker(text) {
            if let Some(license) = composite(text, sources.classifiers) {
                return Some(license);
            }
        }
    }

    if let Some(license) = single(primary, LicenseSource::Declared) {
        return Some(license);
    }

    if let Some(license) = single(non_blank(sources.expression), LicenseSource::Expression) {
        return Some(license);
    }

    for classifier in sources.classifiers {
        if let Some(id) = classifier_license(classifier) {
            debug!(classifier = %classifier, license = %id, "license resolved from classifier");
            return Some(License::new(
                classifier.as_str(),
                LicenseExpr::Single(id),
                LicenseSource::Classifier,
            ));
        }
    }

    single(non_blank(sources.repository), LicenseSource::Repository)
}

fn single(text: Option<&str>, source: LicenseSource) -> Option<License> {
    let text = text?;
    let id = normalize(text)?;
    debug!(%source, license = %id, "license resolved");
    Some(License::new(text, LicenseExpr::Single(id), source))
}

// Classifiers name the licenses; the declared text is only read when they name none.
fn composite(primary: &str, classifiers: &[String]) -> Option<License> {
    let mut ids: BTreeSet<LicenseId> =
        classifiers.iter().filter_map(|c| classifier_license(c)).collect();
    let source = if ids.is_empty() {
        ids.extend(extract_all(primary));
        LicenseSource::Declared
    } else {
        LicenseSource::Classifier
    };

    let canonical = match ids.len() {
        0 => return None,
        1 => LicenseExpr::Single(ids.into_iter().next()?),
        _ => LicenseExpr::Composite(ids),
    };
    debug!(license = %canonical, "multi-license declaration resolved");
    Some(License::new(primary, canonical, source))
}

/// License named by the most specific (rightmost) segment of a classifier.
fn classifier_license(classifier: &str) -> Option<LicenseId> {
    if !classifier.contains(CLASSIFIER_MARKER) {
        return None;
    }
    let segment = classifier.rsplit("::").next()?.trim();
    normalize(segment)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
