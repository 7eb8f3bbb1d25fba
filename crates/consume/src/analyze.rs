use std::collections::BTreeMap;

use log2metrics_core::point::sorted_label_string;
use log2metrics_core::{AnalysisPoint, LogStrategy};

/// Per-line algorithm: match the main regex, parse the first capture group
/// as the value (NaN on a missing or unparseable capture), match every
/// configured tag regex for its label value, and emit an [`AnalysisPoint`].
/// Returns `None` when the main regex does not match — the line is
/// discarded.
pub fn analyze_line(line: &str, strategy: &LogStrategy) -> Option<AnalysisPoint> {
    let pattern_re = strategy.pattern_re.as_ref()?;
    let caps = pattern_re.captures(line)?;

    let value = caps
        .get(1)
        .map(|m| m.as_str())
        .unwrap_or("")
        .parse::<f64>()
        .unwrap_or(f64::NAN);

    // Every configured tag must appear as a key, matched or not, so label
    // sets align across samples.
    let mut label_map = BTreeMap::new();
    for tag_name in strategy.tags.keys() {
        let value = strategy
            .tag_res
            .get(tag_name)
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        label_map.insert(tag_name.clone(), value);
    }

    let sorted = sorted_label_string(&label_map);

    Some(AnalysisPoint {
        value,
        metric_name: strategy.metric_name.clone(),
        log_func: strategy.func,
        sorted_label_string: sorted,
        label_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use log2metrics_core::LogFunc;

    fn strategy(pattern: &str, func: LogFunc, tags: &[(&str, &str)]) -> LogStrategy {
        let s = LogStrategy {
            id: 0,
            metric_name: "m".to_string(),
            metric_help: String::new(),
            file_path: "/x.log".to_string(),
            pattern: pattern.to_string(),
            func,
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            creator: String::new(),
            pattern_re: None,
            tag_res: Default::default(),
        };
        s.compile().unwrap()
    }

    #[test]
    fn cnt_with_no_capture_is_nan_but_matches() {
        let s = strategy(".*", LogFunc::Cnt, &[]);
        let p = analyze_line("anything at all", &s).unwrap();
        assert!(p.value.is_nan());
        assert_eq!(p.sorted_label_string, "");
    }

    #[test]
    fn no_match_is_discarded() {
        let s = strategy("^ERROR", LogFunc::Cnt, &[]);
        assert!(analyze_line("INFO all good", &s).is_none());
    }

    #[test]
    fn sum_with_label_extracts_value_and_tag() {
        let s = strategy(r".*bytes=([0-9]+).*", LogFunc::Sum, &[("host", r".*host=(\S+).*")]);
        let p = analyze_line("bytes=10 host=a", &s).unwrap();
        assert_eq!(p.value, 10.0);
        assert_eq!(p.sorted_label_string, "host=a");
        assert_eq!(p.label_map.get("host"), Some(&"a".to_string()));
    }

    #[test]
    fn unmatched_tag_still_present_as_key() {
        let s = strategy(r".*bytes=([0-9]+).*", LogFunc::Sum, &[("host", r".*host=(\S+).*")]);
        let p = analyze_line("bytes=10", &s).unwrap();
        assert_eq!(p.label_map.get("host"), Some(&String::new()));
    }

    #[test]
    fn unparseable_capture_yields_nan() {
        let s = strategy(r"duration=(\S+)", LogFunc::Avg, &[]);
        let p = analyze_line("duration=fast", &s).unwrap();
        assert!(p.value.is_nan());
    }

    #[test]
    fn multiple_tags_sort_by_key() {
        let s = strategy(
            ".*",
            LogFunc::Cnt,
            &[("zone", r"zone=(\w+)"), ("app", r"app=(\w+)")],
        );
        let p = analyze_line("app=web zone=us", &s).unwrap();
        assert_eq!(p.sorted_label_string, "app=web,zone=us");
    }
}
