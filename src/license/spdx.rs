use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{LicenseId, LicenseRisk};

/// Classify a single canonical SPDX identifier into a risk level.
pub fn classify_spdx_id(id: &str) -> LicenseRisk {
    match id.trim() {
        // Permissive
        "MIT"
        | "Apache-2.0"
        | "BSD-2-Clause"
        | "BSD-3-Clause"
        | "BSD-4-Clause"
        | "ISC"
        | "0BSD"
        | "Unlicense"
        | "Zlib"
        | "CC0-1.0"
        | "WTFPL"
        | "CC-BY-4.0"
        | "CC-BY-3.0"
        | "PSF-2.0"
        | "Python-2.0"
        | "MIT-0"
        | "BlueOak-1.0.0"
        | "Artistic-2.0" => LicenseRisk::Permissive,

        // Weak copyleft
        "LGPL-2.0"
        | "LGPL-2.0-only"
        | "LGPL-2.0-or-later"
        | "LGPL-2.1"
        | "LGPL-2.1-only"
        | "LGPL-2.1-or-later"
        | "LGPL-3.0"
        | "LGPL-3.0-only"
        | "LGPL-3.0-or-later"
        | "MPL-2.0"
        | "EUPL-1.2"
        | "CDDL-1.0"
        | "EPL-1.0"
        | "EPL-2.0"
        | "APSL-2.0"
        | "OSL-3.0" => LicenseRisk::WeakCopyleft,

        // Strong copyleft
        "GPL-2.0"
        | "GPL-2.0-only"
        | "GPL-2.0-or-later"
        | "GPL-3.0"
        | "GPL-3.0-only"
        | "GPL-3.0-or-later"
        | "AGPL-3.0"
        | "AGPL-3.0-only"
        | "AGPL-3.0-or-later"
        | "EUPL-1.1" => LicenseRisk::StrongCopyleft,

        "Proprietary" => LicenseRisk::Proprietary,

        _ => LicenseRisk::Unknown,
    }
}

/// Exact spellings that map straight to an identifier.
fn alias(raw: &str) -> Option<LicenseId> {
    let id = match raw {
        "Apache 2.0" | "Apache License 2.0" | "Apache License, Version 2.0" => LicenseId::Apache2,
        "MIT License" | "The MIT License" | "Expat" | "Expat License" => LicenseId::Mit,
        "BSD" | "BSD License" => LicenseId::Bsd3Clause,
        "BSD 2-Clause" | "Simplified BSD" | "FreeBSD" => LicenseId::Bsd2Clause,
        "BSD 3-Clause" | "New BSD" | "Modified BSD" => LicenseId::Bsd3Clause,
        "GNU GPL v2" | "GNU General Public License v2" | "GPL v2" | "GPLv2" => LicenseId::Gpl2,
        "GNU GPL v3" | "GNU General Public License v3" | "GPL v3" | "GPLv3" => LicenseId::Gpl3,
        "GNU LGPL v2.1" | "LGPL v2.1" | "LGPLv2.1" => LicenseId::Lgpl21,
        "GNU LGPL v3" | "LGPL v3" | "LGPLv3" => LicenseId::Lgpl3,
        "Mozilla Public License 2.0" | "MPL 2.0" | "MPLv2" => LicenseId::Mpl2,
        "ISC License" => LicenseId::Isc,
        "CC0" | "Public Domain" => LicenseId::Cc0,
        "AGPL v3" | "AGPLv3" | "GNU AGPL v3" => LicenseId::Agpl3,
        _ => return None,
    };
    Some(id)
}

struct LicensePattern {
    re: Regex,
    /// Picks the identifier from the matched text (versions, clause counts).
    resolve: fn(&str) -> LicenseId,
}

fn pattern(re: &str, resolve: fn(&str) -> LicenseId) -> LicensePattern {
    LicensePattern {
        re: Regex::new(&format!("(?i){re}")).expect("valid license pattern"),
        resolve,
    }
}

static PATTERNS: Lazy<Vec<LicensePattern>> = Lazy::new(|| {
    vec![
        pattern(
            r"\bAGPL(?:[-\s]?v?\d(?:\.\d)?)?|\bAffero General Public License",
            |_| LicenseId::Agpl3,
        ),
        pattern(
            r"\bLGPL(?:[-\s]?v?\d(?:\.\d)?)?|\b(?:Lesser|Library) General Public License(?:,?\s+(?:version\s+)?v?\d(?:\.\d)?)?",
            |m| {
                if m.contains('3') {
                    LicenseId::Lgpl3
                } else {
                    LicenseId::Lgpl21
                }
            },
        ),
        pattern(
            r"\bGPL(?:[-\s]?v?\d(?:\.\d)?)?|\bGeneral Public License(?:,?\s+(?:version\s+)?v?\d(?:\.\d)?)?",
            |m| {
                if m.contains('2') {
                    LicenseId::Gpl2
                } else {
                    LicenseId::Gpl3
                }
            },
        ),
        pattern(r"\bApache\b", |_| LicenseId::Apache2),
        pattern(r"\bMIT(?:-0)?\b", |m| {
            if m.ends_with("-0") {
                LicenseId::Other("MIT-0".to_string())
            } else {
                LicenseId::Mit
            }
        }),
        pattern(
            r"\b(?:(?:New|Modified|Simplified|Revised)\s+)?BSD(?:[-\s]?\d[-\s]?Clause)?|\b\d[-\s]?Clause\s+BSD",
            |m| {
                if m.contains('4') {
                    LicenseId::Other("BSD-4-Clause".to_string())
                } else if m.contains('2') || m.to_lowercase().contains("simplified") {
                    LicenseId::Bsd2Clause
                } else {
                    LicenseId::Bsd3Clause
                }
            },
        ),
        pattern(
            r"\bMPL(?:[-\s]?v?\d(?:\.\d)?)?|\bMozilla Public License",
            |_| LicenseId::Mpl2,
        ),
        pattern(
            r"\bEPL(?:[-\s]?v?\d(?:\.\d)?)?|\bEclipse Public License(?:\s+v?\d(?:\.\d)?)?",
            |m| {
                if m.contains('1') {
                    LicenseId::Other("EPL-1.0".to_string())
                } else {
                    LicenseId::Epl2
                }
            },
        ),
        pattern(r"\bISC\b", |_| LicenseId::Isc),
        pattern(r"\bUnlicense\b", |_| LicenseId::Unlicense),
        pattern(
            r"\bPSF\b|\bPython Software Foundation\b|\bPython-2\.0\b",
            |_| LicenseId::Psf2,
        ),
        pattern(r"\bzlib\b", |_| LicenseId::Zlib),
        pattern(r"\bCC0\b|\bPublic Domain\b", |_| LicenseId::Cc0),
        pattern(r"\bProprietary\b|\bCommercial\b", |_| LicenseId::Proprietary),
    ]
});

fn bsd_from_text(text: &str) -> LicenseId {
    if text.contains("neither the name") {
        LicenseId::Bsd3Clause
    } else {
        LicenseId::Bsd2Clause
    }
}

fn mit_from_text(_: &str) -> LicenseId {
    LicenseId::Mit
}

fn isc_from_text(_: &str) -> LicenseId {
    LicenseId::Isc
}

fn gpl_from_text(_: &str) -> LicenseId {
    LicenseId::Gpl3
}

/// Keyword groups recognising a license from its body text when no label is present.
/// Every keyword in a group must occur in the lowercased text.
static HEURISTICS: &[(&[&str], fn(&str) -> LicenseId)] = &[
    (&["redistribution", "binary form"], bsd_from_text),
    (&["permission is hereby granted", "free of charge"], mit_from_text),
    (&["permission to use, copy, modify, and/or distribute"], isc_from_text),
    (&["free software", "redistribute it and/or modify"], gpl_from_text),
];

static MULTI_LICENSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:dual|multi(?:ple)?)[-\s]*licen[cs]").expect("valid marker pattern")
});

/// True when the text announces that more than one license applies.
pub fn has_multi_license_marker(text: &str) -> bool {
    MULTI_LICENSE.is_match(text)
}

/// Normalize free text to a single canonical identifier: the first license the
/// text names. Returns `None` when nothing recognisable is present.
///
/// Normalizing an identifier's own SPDX form returns that identifier.
pub fn normalize(raw: &str) -> Option<LicenseId> {
    extract_all(raw).into_iter().next()
}

/// Every license named in the text, in textual order, without duplicates.
pub fn extract_all(raw: &str) -> Vec<LicenseId> {
    let trimmed = raw.trim();
    if trimmed.len() < 3 {
        return Vec::new();
    }

    if let Some(id) = alias(trimmed) {
        return vec![id];
    }

    let labelled = scan_patterns(trimmed);
    if !labelled.is_empty() {
        return labelled;
    }

    let lower = trimmed.to_lowercase();
    for (keywords, resolve) in HEURISTICS {
        if keywords.iter().all(|k| lower.contains(k)) {
            return vec![resolve(&lower)];
        }
    }

    // Well-formed SPDX ids we know about but do not enumerate
    if classify_spdx_id(trimmed) != LicenseRisk::Unknown {
        return vec![LicenseId::Other(trimmed.to_string())];
    }

    Vec::new()
}

/// Run every pattern, keep the leftmost-longest non-overlapping matches.
fn scan_patterns(text: &str) -> Vec<LicenseId> {
    let mut hits: Vec<(usize, usize, LicenseId)> = Vec::new();
    for p in PATTERNS.iter() {
        for m in p.re.find_iter(text) {
            hits.push((m.start(), m.end(), (p.resolve)(m.as_str())));
        }
    }
    hits.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut ids: Vec<LicenseId> = Vec::new();
    let mut covered_to = 0;
    for (start, end, id) in hits {
        if start < covered_to {
            continue;
        }
        covered_to = end;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}
