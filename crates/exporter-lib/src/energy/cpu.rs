//! Processor power model
//!
//! Estimates CPU power draw from thermal design power (TDP) and
//! observed utilization. Power does not scale linearly with load:
//! idle draw is a large fraction of peak, so the utilization-to-power
//! curve is interpolated with a monotone shape-preserving cubic
//! (Fritsch-Carlson) over a fixed set of control points.
//!
//! Vendor-reported processor names are inconsistent ("Intel Xeon
//! Platinum 8175 (Skylake)" vs "AWS Graviton3 Processor"), so lookup
//! runs fuzzy matching over word-prefix substrings of the raw name.

use std::sync::OnceLock;
use tracing::warn;

/// One known processor model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorSpec {
    pub name: &'static str,
    pub family: &'static str,
    pub tdp_watts: f64,
    pub cores: u32,
    pub threads: u32,
}

/// Known processors, from public TDP reference data.
///
/// Index 0 is the fallback used when a vendor name matches nothing.
pub static PROCESSORS: &[ProcessorSpec] = &[
    ProcessorSpec { name: "Intel Xeon Platinum 8175M", family: "Skylake", tdp_watts: 240.0, cores: 24, threads: 48 },
    ProcessorSpec { name: "Intel Xeon Platinum 8259CL", family: "Cascade Lake", tdp_watts: 210.0, cores: 24, threads: 48 },
    ProcessorSpec { name: "Intel Xeon Platinum 8275CL", family: "Cascade Lake", tdp_watts: 240.0, cores: 24, threads: 48 },
    ProcessorSpec { name: "Intel Xeon Platinum 8375C", family: "Ice Lake", tdp_watts: 300.0, cores: 32, threads: 64 },
    ProcessorSpec { name: "Intel Xeon Platinum 8488C", family: "Sapphire Rapids", tdp_watts: 350.0, cores: 48, threads: 96 },
    ProcessorSpec { name: "Intel Xeon E5-2686 v4", family: "Broadwell", tdp_watts: 145.0, cores: 18, threads: 36 },
    ProcessorSpec { name: "Intel Xeon E5-2676 v3", family: "Haswell", tdp_watts: 120.0, cores: 12, threads: 24 },
    ProcessorSpec { name: "AMD EPYC 7571", family: "Naples", tdp_watts: 180.0, cores: 32, threads: 64 },
    ProcessorSpec { name: "AMD EPYC 7R32", family: "Rome", tdp_watts: 180.0, cores: 48, threads: 96 },
    ProcessorSpec { name: "AMD EPYC 7R13", family: "Milan", tdp_watts: 225.0, cores: 48, threads: 96 },
    ProcessorSpec { name: "AMD EPYC 9R14", family: "Genoa", tdp_watts: 400.0, cores: 96, threads: 192 },
    ProcessorSpec { name: "AWS Graviton2", family: "Neoverse N1", tdp_watts: 110.0, cores: 64, threads: 64 },
    ProcessorSpec { name: "AWS Graviton3", family: "Neoverse V1", tdp_watts: 100.0, cores: 64, threads: 64 },
    ProcessorSpec { name: "AWS Graviton4", family: "Neoverse V2", tdp_watts: 130.0, cores: 96, threads: 96 },
];

/// Control points mapping utilization percent to fraction of TDP.
/// Idle servers already dissipate roughly a third of peak.
const POWER_CURVE: &[(f64, f64)] = &[(0.0, 0.32), (10.0, 0.54), (50.0, 0.755), (100.0, 1.02)];

/// Corrects the public curve toward measured sustained draw.
const CALIBRATION_RATIO: f64 = 0.85;

/// Normalized edit-distance ceiling for a fuzzy hit.
const MATCH_THRESHOLD: f64 = 0.25;

/// Estimate watts drawn by `threads_used` threads of `spec` at the
/// given utilization percentage.
pub fn estimate_cpu_watts(spec: &ProcessorSpec, threads_used: u32, utilization_percent: f64) -> f64 {
    if threads_used == 0 || spec.threads == 0 {
        return 0.0;
    }
    static CURVE: OnceLock<MonotoneCurve> = OnceLock::new();
    let curve = CURVE.get_or_init(|| MonotoneCurve::new(POWER_CURVE));
    let fraction = curve.eval(utilization_percent.clamp(0.0, 100.0));
    let package_watts = spec.tdp_watts * fraction * CALIBRATION_RATIO;
    package_watts / f64::from(spec.threads) * f64::from(threads_used)
}

/// Resolve a vendor-reported processor name against the known table.
/// Falls back to the first table entry when nothing matches.
pub fn lookup_processor(raw_name: &str) -> &'static ProcessorSpec {
    lookup_processor_in(PROCESSORS, raw_name)
}

/// Table-parameterized lookup, used directly by tests.
pub fn lookup_processor_in<'a>(table: &'a [ProcessorSpec], raw_name: &str) -> &'a ProcessorSpec {
    let candidates: Vec<String> = table
        .iter()
        .map(|spec| normalize(&format!("{} {}", spec.name, spec.family)))
        .collect();

    // Later substrings are more specific; keep the last one that hits.
    let mut best: Option<usize> = None;
    for substring in word_prefix_substrings(raw_name) {
        if let Some(index) = best_candidate(&substring, &candidates) {
            best = Some(index);
        }
    }

    match best {
        Some(index) => &table[index],
        None => {
            warn!(
                raw_name = %raw_name,
                fallback = %table[0].name,
                "unknown processor name, using default power profile"
            );
            &table[0]
        }
    }
}

/// All left-anchored word-prefix substrings of `raw`, shortest to
/// longest, followed by the remaining single words:
/// `"foo bar baz"` -> `foo`, `foo bar`, `foo bar baz`, `bar`, `baz`.
fn word_prefix_substrings(raw: &str) -> Vec<String> {
    let normalized = normalize(raw);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let mut out = Vec::with_capacity(words.len() * 2);
    for end in 1..=words.len() {
        out.push(words[..end].join(" "));
    }
    for word in words.iter().skip(1) {
        out.push((*word).to_string());
    }
    out
}

/// Best matching candidate index for one substring, if any candidate
/// is close enough.
fn best_candidate(substring: &str, candidates: &[String]) -> Option<usize> {
    if substring.is_empty() {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = match_score(substring, candidate);
        if score <= MATCH_THRESHOLD && best.map_or(true, |(_, s)| score < s) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

/// Distance of `needle` to the closest same-length word window of
/// `haystack`, normalized by the needle length. Containment is a
/// perfect score.
fn match_score(needle: &str, haystack: &str) -> f64 {
    if haystack.contains(needle) {
        return 0.0;
    }
    let needle_words: Vec<&str> = needle.split_whitespace().collect();
    let hay_words: Vec<&str> = haystack.split_whitespace().collect();
    if needle_words.len() > hay_words.len() {
        return f64::MAX;
    }
    let mut best = usize::MAX;
    for window in hay_words.windows(needle_words.len()) {
        let distance = levenshtein_distance(needle, &window.join(" "));
        best = best.min(distance);
    }
    best as f64 / needle.chars().count().max(1) as f64
}

/// Lowercase and strip punctuation so "8175 (Skylake)" and
/// "8175 Skylake" compare equal.
fn normalize(raw: &str) -> String {
    let mapped: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Calculate Levenshtein distance between two strings.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row = vec![0; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (curr_row[j] + 1)
                .min(prev_row[j + 1] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_chars.len()]
}

/// Monotone shape-preserving piecewise cubic (Fritsch-Carlson).
///
/// Interpolating the power curve with a plain cubic spline can
/// overshoot between control points and report power dropping as load
/// rises; the Fritsch-Carlson tangent limiter preserves monotonicity.
struct MonotoneCurve {
    xs: Vec<f64>,
    ys: Vec<f64>,
    tangents: Vec<f64>,
}

impl MonotoneCurve {
    fn new(points: &[(f64, f64)]) -> Self {
        assert!(points.len() >= 2, "curve needs at least two control points");

        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
        let n = xs.len();

        // Secant slopes between consecutive points.
        let mut secants = Vec::with_capacity(n - 1);
        for k in 0..n - 1 {
            secants.push((ys[k + 1] - ys[k]) / (xs[k + 1] - xs[k]));
        }

        // Initial tangents: one-sided at the ends, averaged inside,
        // zeroed at local extrema.
        let mut tangents = vec![0.0; n];
        tangents[0] = secants[0];
        tangents[n - 1] = secants[n - 2];
        for k in 1..n - 1 {
            if secants[k - 1] * secants[k] <= 0.0 {
                tangents[k] = 0.0;
            } else {
                tangents[k] = (secants[k - 1] + secants[k]) / 2.0;
            }
        }

        // Fritsch-Carlson limiter keeps each segment monotone.
        for k in 0..n - 1 {
            if secants[k] == 0.0 {
                tangents[k] = 0.0;
                tangents[k + 1] = 0.0;
                continue;
            }
            let alpha = tangents[k] / secants[k];
            let beta = tangents[k + 1] / secants[k];
            let radius = alpha * alpha + beta * beta;
            if radius > 9.0 {
                let tau = 3.0 / radius.sqrt();
                tangents[k] = tau * alpha * secants[k];
                tangents[k + 1] = tau * beta * secants[k];
            }
        }

        Self { xs, ys, tangents }
    }

    fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }

        let mut k = 0;
        while k < n - 2 && x > self.xs[k + 1] {
            k += 1;
        }

        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.ys[k]
            + h10 * h * self.tangents[k]
            + h01 * self.ys[k + 1]
            + h11 * h * self.tangents[k + 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_exact_name() {
        let spec = lookup_processor("AMD EPYC 7571");
        assert_eq!(spec.name, "AMD EPYC 7571");
        assert_eq!(spec.family, "Naples");
    }

    #[test]
    fn test_lookup_vendor_decorated_name() {
        let spec = lookup_processor("Intel Xeon Platinum 8175 (Skylake)");
        assert_eq!(spec.name, "Intel Xeon Platinum 8175M");

        let spec = lookup_processor("AWS Graviton3 Processor");
        assert_eq!(spec.name, "AWS Graviton3");
    }

    #[test]
    fn test_lookup_empty_string_falls_back_to_first_entry() {
        let spec = lookup_processor("");
        assert_eq!(spec.name, PROCESSORS[0].name);
    }

    #[test]
    fn test_lookup_gibberish_falls_back_to_first_entry() {
        let table = [
            ProcessorSpec { name: "AMD EPYC 7571", family: "Naples", tdp_watts: 10.0, cores: 1, threads: 1 },
            ProcessorSpec { name: "Intel Xeon", family: "Saphire", tdp_watts: 1000.0, cores: 1, threads: 1 },
        ];
        assert_eq!(lookup_processor_in(&table, "AMD EPYC 7571").tdp_watts, 10.0);
        assert_eq!(lookup_processor_in(&table, "").tdp_watts, 10.0);
        assert_eq!(lookup_processor_in(&table, "zzzzzzzz qqqqqq").tdp_watts, 10.0);
    }

    #[test]
    fn test_word_prefix_substrings_order() {
        let subs = word_prefix_substrings("foo bar baz");
        assert_eq!(subs, vec!["foo", "foo bar", "foo bar baz", "bar", "baz"]);
    }

    #[test]
    fn test_curve_is_monotone_and_bounded() {
        let curve = MonotoneCurve::new(POWER_CURVE);
        let mut previous = curve.eval(0.0);
        for step in 1..=100 {
            let value = curve.eval(f64::from(step));
            assert!(value >= previous, "curve dipped at {step}%");
            previous = value;
        }
        assert!((curve.eval(0.0) - 0.32).abs() < 1e-9);
        assert!((curve.eval(100.0) - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_curve_hits_control_points() {
        let curve = MonotoneCurve::new(POWER_CURVE);
        for (x, y) in POWER_CURVE {
            assert!((curve.eval(*x) - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_estimate_cpu_watts_idle_is_nonzero() {
        let spec = &PROCESSORS[0];
        let idle = estimate_cpu_watts(spec, spec.threads, 0.0);
        let full = estimate_cpu_watts(spec, spec.threads, 100.0);
        assert!(idle > 0.0);
        assert!(full > idle);
        // Idle draw is a large fraction of peak.
        assert!(idle / full > 0.25);
    }

    #[test]
    fn test_estimate_cpu_watts_scales_with_threads() {
        let spec = &PROCESSORS[0];
        let two = estimate_cpu_watts(spec, 2, 50.0);
        let four = estimate_cpu_watts(spec, 4, 50.0);
        assert!((four - two * 2.0).abs() < 1e-9);
        assert_eq!(estimate_cpu_watts(spec, 0, 50.0), 0.0);
    }

    #[test]
    fn test_estimate_cpu_watts_clamps_utilization() {
        let spec = &PROCESSORS[0];
        let over = estimate_cpu_watts(spec, 1, 250.0);
        let full = estimate_cpu_watts(spec, 1, 100.0);
        assert!((over - full).abs() < 1e-9);
    }
}
