//! Regional carbon intensity lookup
//!
//! Maps region strings to grams of CO2-equivalent per kWh and converts
//! watts metrics into emission-rate metrics. Lookup is longest-prefix
//! so `eu-central-1` can fall back to an `eu` aggregate, and every map
//! carries a synthesized `global` entry as the final fallback.
//!
//! Providers without a published intensity dataset derive one by
//! mapping each of their regions onto the nearest region of a provider
//! that does publish data.

use crate::energy::primitives::g_per_kwh_to_g_per_ws;
use crate::models::{Metric, Provider, EMISSIONS_METRIC_NAME};
use std::collections::BTreeMap;

/// AWS regional grid intensities in gCO2eq/kWh, from public grid data.
static AWS_INTENSITY: &[(&str, f64)] = &[
    ("us-east-1", 379.0),
    ("us-east-2", 410.0),
    ("us-west-1", 210.0),
    ("us-west-2", 120.0),
    ("ca-central-1", 130.0),
    ("sa-east-1", 61.0),
    ("eu-west-1", 316.0),
    ("eu-west-2", 228.0),
    ("eu-west-3", 52.0),
    ("eu-central-1", 338.0),
    ("eu-north-1", 8.0),
    ("eu-south-1", 233.0),
    ("ap-southeast-1", 408.0),
    ("ap-southeast-2", 548.0),
    ("ap-northeast-1", 506.0),
    ("ap-northeast-2", 500.0),
    ("ap-south-1", 708.0),
    ("ap-east-1", 710.0),
    ("me-south-1", 505.0),
    ("af-south-1", 900.0),
];

/// GCP regions mapped to their nearest AWS region.
static GCP_TO_AWS: &[(&str, &str)] = &[
    ("us-central1", "us-east-2"),
    ("us-east1", "us-east-1"),
    ("us-east4", "us-east-1"),
    ("us-west1", "us-west-2"),
    ("us-west2", "us-west-1"),
    ("europe-west1", "eu-west-3"),
    ("europe-west2", "eu-west-2"),
    ("europe-west3", "eu-central-1"),
    ("europe-west4", "eu-central-1"),
    ("europe-north1", "eu-north-1"),
    ("asia-east1", "ap-east-1"),
    ("asia-east2", "ap-east-1"),
    ("asia-northeast1", "ap-northeast-1"),
    ("asia-south1", "ap-south-1"),
    ("asia-southeast1", "ap-southeast-1"),
    ("australia-southeast1", "ap-southeast-2"),
    ("southamerica-east1", "sa-east-1"),
];

/// Scaleway regions mapped to their nearest AWS region.
static SCW_TO_AWS: &[(&str, &str)] = &[
    ("fr-par", "eu-west-3"),
    ("nl-ams", "eu-central-1"),
    ("pl-waw", "eu-central-1"),
];

/// Synthetic aggregate keys and the region prefixes they average over.
static CONTINENT_PREFIXES: &[(&str, &[&str])] = &[
    ("emea", &["eu", "europe", "me", "af", "fr-", "nl-", "pl-"]),
    ("apac", &["ap", "asia", "australia"]),
    ("amer", &["us", "ca", "sa", "northamerica", "southamerica"]),
];

/// Region -> gCO2eq/kWh table with longest-prefix lookup
#[derive(Debug, Clone)]
pub struct CarbonIntensityMap {
    entries: BTreeMap<String, f64>,
}

impl CarbonIntensityMap {
    /// Build a map from raw region entries, synthesizing the `global`
    /// and continent aggregate keys when absent.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, f64)>) -> Self {
        let mut map = Self {
            entries: entries.into_iter().collect(),
        };
        assert!(!map.entries.is_empty(), "carbon intensity map must not be empty");

        for (key, prefixes) in CONTINENT_PREFIXES {
            if map.entries.contains_key(*key) {
                continue;
            }
            if let Some(value) = map.try_average(prefixes) {
                map.entries.insert((*key).to_string(), value);
            }
        }
        if !map.entries.contains_key("global") {
            let value = map.average(&[]);
            map.entries.insert("global".to_string(), value);
        }
        map
    }

    /// The published (or derived) intensity map for one provider.
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            // The demo provider mimics an AWS fleet.
            Provider::Aws | Provider::Demo => Self::from_entries(
                AWS_INTENSITY.iter().map(|(k, v)| ((*k).to_string(), *v)),
            ),
            Provider::Gcp => Self::derived_from_aws(GCP_TO_AWS),
            Provider::Scaleway => Self::derived_from_aws(SCW_TO_AWS),
        }
    }

    /// Import AWS intensities under another provider's region keys.
    fn derived_from_aws(mapping: &[(&str, &str)]) -> Self {
        let aws: BTreeMap<&str, f64> = AWS_INTENSITY.iter().copied().collect();
        Self::from_entries(mapping.iter().map(|(region, aws_region)| {
            let value = *aws
                .get(aws_region)
                .expect("region mapping points at a known AWS region");
            ((*region).to_string(), value)
        }))
    }

    /// Intensity for `region`: the value of the longest stored key
    /// that is a string prefix of `region`, else the `global` value.
    pub fn get(&self, region: &str) -> f64 {
        let mut best: Option<(&str, f64)> = None;
        for (key, value) in &self.entries {
            if region.starts_with(key.as_str())
                && best.map_or(true, |(k, _)| key.len() > k.len())
            {
                best = Some((key, *value));
            }
        }
        match best {
            Some((_, value)) => value,
            None => *self
                .entries
                .get("global")
                .expect("carbon intensity map must contain a global entry"),
        }
    }

    /// Unweighted mean over entries whose key starts with any of the
    /// given prefixes; with no prefixes, averages everything.
    pub fn average(&self, prefixes: &[&str]) -> f64 {
        self.try_average(prefixes).unwrap_or(0.0)
    }

    fn try_average(&self, prefixes: &[&str]) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (key, value) in &self.entries {
            if prefixes.is_empty() || prefixes.iter().any(|p| key.starts_with(p)) {
                sum += value;
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Derive the emission-rate metric from a watts metric.
    ///
    /// Returns `None` when the metric carries no `region` label: a
    /// power figure cannot be rated without a location. Labels are
    /// carried over verbatim so consumers can correlate the pair.
    pub fn co2eq_from_watts(&self, watts: &Metric) -> Option<Metric> {
        let region = watts.labels.get("region")?;
        let intensity = self.get(region);

        let mut emissions = watts.clone();
        emissions.name = EMISSIONS_METRIC_NAME.to_string();
        emissions.value = watts.value * g_per_kwh_to_g_per_ws(intensity);
        Some(emissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WATTS_METRIC_NAME;

    fn test_map() -> CarbonIntensityMap {
        CarbonIntensityMap::from_entries([
            ("global".to_string(), 2.0),
            ("eu".to_string(), 1.5),
            ("eu-west-1".to_string(), 1.0),
        ])
    }

    #[test]
    fn test_get_longest_prefix_wins() {
        let map = test_map();
        assert_eq!(map.get("eu-west-1"), 1.0);
        assert_eq!(map.get("eu-central-1"), 1.5);
        assert_eq!(map.get("us-east-1"), 2.0);
    }

    #[test]
    fn test_average_with_and_without_prefixes() {
        let map = CarbonIntensityMap::from_entries([
            ("a".to_string(), 1.0),
            ("b".to_string(), 2.0),
            ("c".to_string(), 3.0),
            ("global".to_string(), 2.0),
        ]);
        // `global` itself participates like any other entry.
        assert_eq!(map.average(&[]), 2.0);
        assert_eq!(map.average(&["a"]), 1.0);
        assert_eq!(map.average(&["a", "b", "c"]), 2.0);
        assert_eq!(map.average(&["nope"]), 0.0);
    }

    #[test]
    fn test_global_synthesized_when_absent() {
        let map = CarbonIntensityMap::from_entries([
            ("x-1".to_string(), 1.0),
            ("y-1".to_string(), 3.0),
        ]);
        assert_eq!(map.get("unmapped-region"), 2.0);
    }

    #[test]
    fn test_co2eq_unit_chain() {
        let map = CarbonIntensityMap::from_entries([
            ("global".to_string(), 1000.0),
            ("eu-west-1".to_string(), 1000.0),
        ]);
        let watts = Metric::new(WATTS_METRIC_NAME, 3600.0).with_label("region", "eu-west-1");

        let emissions = map.co2eq_from_watts(&watts).unwrap();
        assert_eq!(emissions.name, EMISSIONS_METRIC_NAME);
        // 3600 W sustained emits 3600 g/h at 1000 g/kWh, i.e. 1 g/s.
        assert!((emissions.value - 1.0).abs() < 1e-9);
        assert_eq!(emissions.labels, watts.labels);
    }

    #[test]
    fn test_co2eq_requires_region_label() {
        let map = test_map();
        let watts = Metric::new(WATTS_METRIC_NAME, 10.0);
        assert!(map.co2eq_from_watts(&watts).is_none());
    }

    #[test]
    fn test_provider_maps_have_global_and_continents() {
        for provider in [Provider::Aws, Provider::Gcp, Provider::Scaleway, Provider::Demo] {
            let map = CarbonIntensityMap::for_provider(provider);
            assert!(map.get("definitely-not-a-region") > 0.0);
            assert!(map.average(&[]) > 0.0);
        }
    }

    #[test]
    fn test_derived_map_imports_aws_values() {
        let scw = CarbonIntensityMap::for_provider(Provider::Scaleway);
        let aws = CarbonIntensityMap::for_provider(Provider::Aws);
        assert_eq!(scw.get("fr-par-1"), aws.get("eu-west-3"));
    }
}
