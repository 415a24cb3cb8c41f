//! Serialization of buffer parameters into hit URLs.

pub mod encoding;
pub mod multihit;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Hit, Param};

pub use encoding::{Segment, assemble, percent_encode};
pub use multihit::{MultihitPolicy, SplitResult, split};

/// Collection endpoint coordinates, read from the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub secure: bool,
    pub log: String,
    pub log_ssl: String,
    pub domain: String,
    pub pixel_path: String,
    pub site: String,
}

impl Endpoint {
    /// `scheme://[log.]domain/pixelPath?s=site`; the subdomain is skipped
    /// when the matching log prefix is empty.
    pub fn base_url(&self) -> String {
        let (scheme, prefix) = if self.secure {
            ("https", &self.log_ssl)
        } else {
            ("http", &self.log)
        };
        let host = if prefix.is_empty() {
            self.domain.clone()
        } else {
            format!("{prefix}.{}", self.domain)
        };
        let path = if self.pixel_path.is_empty() || self.pixel_path.starts_with('/') {
            self.pixel_path.clone()
        } else {
            format!("/{}", self.pixel_path)
        };
        format!("{scheme}://{host}{path}?s={}", self.site)
    }
}

/// Result of one build pass. The builder never fails; anything it had to
/// compromise on is listed in `warnings`.
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub hits: Vec<Hit>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Builder {
    policy: MultihitPolicy,
}

impl Builder {
    pub fn new(policy: MultihitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MultihitPolicy {
        &self.policy
    }

    pub fn build(&self, endpoint: &Endpoint, params: &[Param]) -> BuildOutput {
        self.build_at(endpoint, params, Utc::now())
    }

    /// Serializes `params` (persistent first, then volatile) into one hit,
    /// or several linked ones when the query exceeds the policy limit.
    /// Every parameter is evaluated exactly once.
    pub fn build_at(&self, endpoint: &Endpoint, params: &[Param], created_at: DateTime<Utc>) -> BuildOutput {
        let base = endpoint.base_url();
        let segments = assemble(params);
        let query: String = segments.iter().map(Segment::render).collect();

        let mut output = BuildOutput::default();

        if base.len() + query.len() <= self.policy.max_hit_length {
            output.hits.push(Hit::new(format!("{base}{query}"), created_at));
            return output;
        }

        let multihit_id = rand::rng().random_range(0..1_000_000_000u32);
        let urls = match split(&base, &segments, &self.policy, multihit_id, &mut output.warnings) {
            SplitResult::Parts(parts) => parts,
            SplitResult::Overflow(error_hit) => vec![error_hit],
        };
        debug!("Split oversize hit into {} parts (mh id {})", urls.len(), multihit_id);

        for warning in &output.warnings {
            warn!("{}", warning);
        }
        output.hits = urls.into_iter().map(|url| Hit::new(url, created_at)).collect();
        output
    }
}
