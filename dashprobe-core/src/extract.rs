//! Generic extraction strategies: derive a single scalar value from a raw
//! payload.

use crate::error::{Error, Result};
use crate::model::{ExtractionSpec, Payload};
use scraper::{Html, Selector};

/// Apply the configured strategy to the payload.
///
/// `None` always yields no value. `Css` and `Pattern` require a text
/// payload; handing them an image is a configuration error, not a runtime
/// type failure. An empty payload yields no value for either strategy.
pub fn extract_value(payload: &Payload, spec: &ExtractionSpec) -> Result<Option<String>> {
    match spec {
        ExtractionSpec::None => Ok(None),
        ExtractionSpec::Css { path } => {
            if path.trim().is_empty() {
                return Err(Error::Config("css extraction requires 'path'".into()));
            }
            let body = match payload {
                Payload::Text { body } => body,
                Payload::Empty => return Ok(None),
                other => {
                    return Err(Error::Config(format!(
                        "css extraction requires a text payload, got {}",
                        other.kind()
                    )))
                }
            };
            let selector = Selector::parse(path)
                .map_err(|e| Error::Config(format!("invalid css selector '{path}': {e}")))?;
            let document = Html::parse_document(body);
            Ok(document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string()))
        }
        ExtractionSpec::Pattern { pattern } => {
            if pattern.trim().is_empty() {
                return Err(Error::Config("pattern extraction requires 'pattern'".into()));
            }
            let body = match payload {
                Payload::Text { body } => body.as_str(),
                Payload::Empty => return Ok(None),
                other => {
                    return Err(Error::Config(format!(
                        "pattern extraction requires a text payload, got {}",
                        other.kind()
                    )))
                }
            };
            let re = regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .dot_matches_new_line(true)
                .build()
                .map_err(|e| Error::Config(format!("invalid pattern '{pattern}': {e}")))?;
            Ok(re.captures(body).and_then(|caps| {
                if re.captures_len() > 1 {
                    caps.get(1).or_else(|| caps.get(0))
                } else {
                    caps.get(0)
                }
                .map(|m| m.as_str().to_string())
            }))
        }
        ExtractionSpec::Other { kind } => Err(Error::UnsupportedStrategy(kind.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_strategy_yields_no_value() {
        let payload = Payload::text("<html></html>");
        assert_eq!(extract_value(&payload, &ExtractionSpec::None).unwrap(), None);
    }

    #[test]
    fn css_returns_trimmed_text() {
        let payload = Payload::text("<div><span class='price'>  R$ 10,00 </span></div>");
        let spec = ExtractionSpec::Css {
            path: ".price".into(),
        };
        assert_eq!(
            extract_value(&payload, &spec).unwrap(),
            Some("R$ 10,00".to_string())
        );
    }

    #[test]
    fn css_missing_element_yields_none() {
        let payload = Payload::text("<div></div>");
        let spec = ExtractionSpec::Css {
            path: ".absent".into(),
        };
        assert_eq!(extract_value(&payload, &spec).unwrap(), None);
    }

    #[test]
    fn css_on_image_payload_is_config_error() {
        let payload = Payload::Image {
            path: "shot.png".into(),
        };
        let spec = ExtractionSpec::Css { path: "h1".into() };
        assert!(matches!(
            extract_value(&payload, &spec),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn pattern_with_group_returns_group() {
        let payload = Payload::text("total: 1234.56 units");
        let spec = ExtractionSpec::Pattern {
            pattern: r"total:\s*([\d.]+)".into(),
        };
        assert_eq!(
            extract_value(&payload, &spec).unwrap(),
            Some("1234.56".to_string())
        );
    }

    #[test]
    fn pattern_without_group_returns_whole_match() {
        let payload = Payload::text("status=ACTIVE");
        let spec = ExtractionSpec::Pattern {
            pattern: r"status=\w+".into(),
        };
        assert_eq!(
            extract_value(&payload, &spec).unwrap(),
            Some("status=ACTIVE".to_string())
        );
    }

    #[test]
    fn pattern_without_match_returns_none() {
        let payload = Payload::text("nothing here");
        let spec = ExtractionSpec::Pattern {
            pattern: r"\d{5}".into(),
        };
        assert_eq!(extract_value(&payload, &spec).unwrap(), None);
    }

    #[test]
    fn pattern_is_case_insensitive_and_multiline() {
        let payload = Payload::text("line one\nTOTAL: 7\nline three");
        let spec = ExtractionSpec::Pattern {
            pattern: r"total:\s*(\d+)".into(),
        };
        assert_eq!(extract_value(&payload, &spec).unwrap(), Some("7".into()));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let payload = Payload::text("x");
        let spec = ExtractionSpec::Other {
            kind: "xpath".into(),
        };
        assert!(matches!(
            extract_value(&payload, &spec),
            Err(Error::UnsupportedStrategy(k)) if k == "xpath"
        ));
    }
}
