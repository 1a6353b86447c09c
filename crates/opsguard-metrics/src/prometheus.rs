//! Prometheus text exposition format.
//!
//! Renders the latest sample of each metric series, plus any extra
//! gauges the caller supplies (instance count, breaker state), for
//! scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use opsguard_core::Metric;

/// A gauge not backed by the metric store.
#[derive(Debug, Clone)]
pub struct Gauge {
    pub name: &'static str,
    pub help: &'static str,
    pub value: f64,
}

/// Render latest samples and extra gauges into Prometheus text format.
///
/// Sample names are prefixed with `opsguard_`. Tags become labels.
pub fn render_prometheus(latest: &[Metric], extra: &[Gauge]) -> String {
    let mut out = String::new();

    for m in latest {
        let name = format!("opsguard_{}", sanitize(&m.name));
        let _ = writeln!(out, "# HELP {name} Latest {} sample.", m.name);
        let _ = writeln!(out, "# TYPE {name} gauge");
        let _ = writeln!(out, "{name}{} {}", labels(m), m.value);
    }

    for g in extra {
        let _ = writeln!(out, "# HELP opsguard_{} {}", g.name, g.help);
        let _ = writeln!(out, "# TYPE opsguard_{} gauge", g.name);
        let _ = writeln!(out, "opsguard_{} {}", g.name, g.value);
    }

    out
}

fn labels(m: &Metric) -> String {
    match &m.tags {
        Some(tags) if !tags.is_empty() => {
            let pairs: Vec<String> = tags
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", sanitize(k), v.replace('"', "\\\"")))
                .collect();
            format!("{{{}}}", pairs.join(","))
        }
        _ => String::new(),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample(name: &str, value: f64) -> Metric {
        Metric {
            name: name.to_string(),
            timestamp: 1000,
            value,
            tags: None,
        }
    }

    #[test]
    fn render_empty() {
        assert!(render_prometheus(&[], &[]).is_empty());
    }

    #[test]
    fn render_samples_and_gauges() {
        let output = render_prometheus(
            &[sample("cpu_usage", 42.5), sample("request_count", 12.0)],
            &[Gauge {
                name: "instances",
                help: "Running application instances.",
                value: 3.0,
            }],
        );

        assert!(output.contains("# TYPE opsguard_cpu_usage gauge"));
        assert!(output.contains("opsguard_cpu_usage 42.5\n"));
        assert!(output.contains("opsguard_request_count 12\n"));
        assert!(output.contains("# HELP opsguard_instances Running application instances."));
        assert!(output.contains("opsguard_instances 3\n"));
    }

    #[test]
    fn tags_become_labels() {
        let mut m = sample("cpu.usage", 1.0);
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), "web-1".to_string());
        m.tags = Some(tags);

        let output = render_prometheus(&[m], &[]);
        assert!(output.contains("opsguard_cpu_usage{host=\"web-1\"} 1\n"));
    }

    #[test]
    fn every_sample_line_has_a_value() {
        let output = render_prometheus(&[sample("error_rate", 0.5)], &[]);
        for line in output.lines() {
            if line.starts_with('#') {
                continue;
            }
            assert_eq!(line.split_whitespace().count(), 2, "bad line: {line}");
        }
    }
}
