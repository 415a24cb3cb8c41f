//! Splitting of one oversize logical hit into linked partial hits.

use serde::{Deserialize, Serialize};

use super::encoding::Segment;

/// Split threshold and linkage rules. Wire limits differ per collection
/// endpoint, so none of this is hardcoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultihitPolicy {
    /// Maximum length of one hit URL, in bytes.
    pub max_hit_length: usize,
    /// Maximum number of partial hits for one logical hit.
    pub max_hits: usize,
    /// Keys repeated in every partial hit.
    pub always_included: Vec<String>,
}

impl Default for MultihitPolicy {
    fn default() -> Self {
        Self {
            max_hit_length: 1600,
            max_hits: 999,
            always_included: ["vtag", "ptag", "idclient", "ts", "olt", "cn", "p"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl MultihitPolicy {
    pub fn is_always_included(&self, key: &str) -> bool {
        self.always_included.iter().any(|k| k == key)
    }
}

#[derive(Debug, PartialEq)]
pub enum SplitResult {
    /// Partial hit URLs, in order.
    Parts(Vec<String>),
    /// More parts than the policy allows; a single error hit replaces them.
    Overflow(String),
}

/// Partitions `segments` across hits that each start with `base`, the
/// always-included segments and an `mh={index}-{count}-{id}` marker.
///
/// Splittable segments keep insertion order and fill each part up to the
/// limit. An appended segment too big for one part is split by value; a
/// single value too big for any part travels alone and is reported.
pub fn split(
    base: &str,
    segments: &[Segment],
    policy: &MultihitPolicy,
    multihit_id: u32,
    warnings: &mut Vec<String>,
) -> SplitResult {
    let (repeated, splittable): (Vec<&Segment>, Vec<&Segment>) = segments
        .iter()
        .partition(|segment| policy.is_always_included(&segment.key));
    let always: String = repeated.iter().map(|segment| segment.render()).collect();

    let widest_marker = format!("&mh={0}-{0}-{1}", policy.max_hits, multihit_id).len();
    let room = policy
        .max_hit_length
        .saturating_sub(base.len() + always.len() + widest_marker);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for segment in splittable {
        let rendered = segment.render();
        if current.len() + rendered.len() <= room {
            current.push_str(&rendered);
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if rendered.len() <= room {
            current = rendered;
            continue;
        }
        for piece in split_values(segment, room, warnings) {
            chunks.push(piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    // Only always-included segments overflow: send them as a single part.
    if chunks.is_empty() {
        if let Some(widest) = repeated.iter().max_by_key(|segment| segment.rendered_len()) {
            warnings.push(too_long(&widest.key));
        }
        chunks.push(String::new());
    }

    if chunks.len() > policy.max_hits {
        warnings.push(format!(
            "Hit needs {} parts, more than the {} allowed. Sending error hit instead",
            chunks.len(),
            policy.max_hits
        ));
        return SplitResult::Overflow(format!("{base}{always}&mherr=1"));
    }

    let count = chunks.len();
    let parts = chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| format!("{base}{always}&mh={}-{count}-{multihit_id}{chunk}", index + 1))
        .collect();
    SplitResult::Parts(parts)
}

fn split_values(segment: &Segment, room: usize, warnings: &mut Vec<String>) -> Vec<String> {
    if segment.json_merge || segment.values.len() < 2 {
        warnings.push(too_long(&segment.key));
        return vec![segment.render()];
    }

    let mut pieces = Vec::new();
    let mut values: Vec<String> = Vec::new();

    for value in &segment.values {
        let mut candidate = values.clone();
        candidate.push(value.clone());
        if segment.with_values(candidate.clone()).rendered_len() <= room {
            values = candidate;
            continue;
        }
        if !values.is_empty() {
            pieces.push(segment.with_values(std::mem::take(&mut values)).render());
        }
        let single = segment.with_values(vec![value.clone()]);
        if single.rendered_len() <= room {
            values.push(value.clone());
        } else {
            warnings.push(too_long(&segment.key));
            pieces.push(single.render());
        }
    }
    if !values.is_empty() {
        pieces.push(segment.with_values(values).render());
    }
    pieces
}

fn too_long(key: &str) -> String {
    format!("Parameter {key} is too long to fit in a single hit")
}
