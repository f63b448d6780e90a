//! IMEI grouping by 8-digit type allocation code.

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;

const TAC_LEN: usize = 8;

static IMEI_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b\d{15}\b").ok());

/// IMEIs grouped by their first eight digits, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Grouping {
    /// Prefixes shared by two or more IMEIs.
    pub twins: Vec<(String, Vec<String>)>,
    /// IMEIs with a unique prefix.
    pub singles: Vec<String>,
}

impl Grouping {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.twins.is_empty() && self.singles.is_empty()
    }

    /// Text block for the reply.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.twins.is_empty() {
            out.push_str(&format!("👯 *KEMBAR* ({} grup)\n", self.twins.len()));
            for (prefix, imeis) in &self.twins {
                out.push_str(&format!("\n• {prefix} ({})\n", imeis.len()));
                for imei in imeis {
                    out.push_str(imei);
                    out.push('\n');
                }
            }
        }
        if !self.singles.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("🔹 *TUNGGAL* ({})\n", self.singles.len()));
            for imei in &self.singles {
                out.push_str(imei);
                out.push('\n');
            }
        }
        out.trim_end().to_string()
    }
}

/// Pull 15-digit IMEIs out of free text, dropping duplicates.
#[must_use]
pub fn extract_imeis(text: &str) -> Vec<String> {
    let Some(re) = IMEI_RE.as_ref() else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    re.find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|imei| seen.insert(imei.clone()))
        .collect()
}

#[must_use]
pub fn group(imeis: &[String]) -> Grouping {
    let mut order: Vec<&str> = Vec::new();
    let mut buckets: HashMap<&str, Vec<String>> = HashMap::new();
    for imei in imeis {
        let prefix = imei.get(..TAC_LEN).unwrap_or(imei);
        buckets
            .entry(prefix)
            .or_insert_with(|| {
                order.push(prefix);
                Vec::new()
            })
            .push(imei.clone());
    }

    let mut grouping = Grouping::default();
    for prefix in order {
        let Some(imeis) = buckets.remove(prefix) else {
            continue;
        };
        if imeis.len() >= 2 {
            grouping.twins.push((prefix.to_string(), imeis));
        } else {
            grouping.singles.extend(imeis);
        }
    }
    grouping
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_dedupes() {
        let text = "353456780000011\n353456780000011, 35345678000002 1234567890123456 354000000000001";
        assert_eq!(
            extract_imeis(text),
            vec!["353456780000011".to_string(), "354000000000001".to_string()]
        );
    }

    #[test]
    fn groups_by_prefix() {
        let imeis: Vec<String> = [
            "353456780000011",
            "359999990000001",
            "353456780000029",
            "353456780000037",
            "354000000000001",
            "354000000000019",
            "351111110000001",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let grouping = group(&imeis);
        assert_eq!(grouping.twins.len(), 2);
        assert_eq!(grouping.twins[0].0, "35345678");
        assert_eq!(grouping.twins[0].1.len(), 3);
        assert_eq!(grouping.twins[1].0, "35400000");
        assert_eq!(
            grouping.singles,
            vec!["359999990000001".to_string(), "351111110000001".to_string()]
        );
    }

    #[test]
    fn render_lists_sections() {
        let grouping = group(&[
            "353456780000011".to_string(),
            "353456780000029".to_string(),
            "359999990000001".to_string(),
        ]);
        let text = grouping.render();
        assert!(text.starts_with("👯 *KEMBAR* (1 grup)"));
        assert!(text.contains("• 35345678 (2)"));
        assert!(text.contains("🔹 *TUNGGAL* (1)\n359999990000001"));
    }

    #[test]
    fn empty_input() {
        assert!(group(&[]).is_empty());
        assert!(extract_imeis("no numbers here").is_empty());
    }
}
