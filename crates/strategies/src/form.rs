use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use juriscrape_core::config::FormDiscoveryConfig;
use juriscrape_core::types::ExtractionMethod;
use juriscrape_core::CrawlError;
use juriscrape_extract::html::find_pdf_urls_with_base;
use juriscrape_net::AdaptiveRateLimiter;

use crate::{PatternFilter, SeedStrategy, StrategyResult};

const SELECT_OPTION_CAP: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum FormInputKind {
    Text { value: String },
    Select { options: Vec<String> },
    /// Checkbox or radio: submitted either absent or with its value.
    Toggle { value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormInput {
    pub name: String,
    pub kind: FormInputKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedForm {
    pub action: String,
    pub method: String,
    pub inputs: Vec<FormInput>,
}

/// Parse every `<form>` with an action attribute out of a page.
pub fn parse_forms(html: &str, base: &Url) -> Vec<ParsedForm> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse("form").expect("static selector");
    let field_selector = Selector::parse("input, select, textarea").expect("static selector");
    let option_selector = Selector::parse("option").expect("static selector");

    let mut forms = Vec::new();
    for form in document.select(&form_selector) {
        let Some(action) = form.value().attr("action") else {
            continue;
        };
        let Ok(action) = base.join(action) else {
            continue;
        };
        let method = form
            .value()
            .attr("method")
            .unwrap_or("get")
            .to_ascii_lowercase();

        let mut inputs = Vec::new();
        for field in form.select(&field_selector) {
            let Some(name) = field.value().attr("name") else {
                continue;
            };
            let kind = match field.value().name() {
                "select" => FormInputKind::Select {
                    options: select_options(&field, &option_selector),
                },
                "textarea" => FormInputKind::Text {
                    value: field.text().collect::<String>().trim().to_string(),
                },
                _ => {
                    let value = field.value().attr("value").unwrap_or("").to_string();
                    match field.value().attr("type").map(str::to_ascii_lowercase) {
                        Some(t) if t == "checkbox" || t == "radio" => {
                            FormInputKind::Toggle { value }
                        }
                        _ => FormInputKind::Text { value },
                    }
                }
            };
            inputs.push(FormInput {
                name: name.to_string(),
                kind,
            });
        }

        forms.push(ParsedForm {
            action: action.to_string(),
            method,
            inputs,
        });
    }
    forms
}

fn select_options(field: &ElementRef<'_>, option_selector: &Selector) -> Vec<String> {
    field
        .select(option_selector)
        .filter_map(|opt| {
            let value = opt
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| opt.text().collect::<String>().trim().to_string());
            (!value.is_empty()).then_some(value)
        })
        .collect()
}

/// Enumerate submission parameter sets: the all-defaults base, then one
/// variation per interesting field value (first 5 options per select,
/// present/absent per toggle), bounded by `max_combinations`.
pub fn enumerate_combinations(
    inputs: &[FormInput],
    max_combinations: usize,
) -> Vec<Vec<(String, String)>> {
    let mut base: BTreeMap<String, String> = BTreeMap::new();
    let mut selections: Vec<(String, Vec<String>)> = Vec::new();

    for input in inputs {
        match &input.kind {
            FormInputKind::Text { value } => {
                base.insert(input.name.clone(), value.clone());
            }
            FormInputKind::Select { options } => {
                if options.is_empty() {
                    base.insert(input.name.clone(), String::new());
                } else {
                    selections.push((
                        input.name.clone(),
                        options.iter().take(SELECT_OPTION_CAP).cloned().collect(),
                    ));
                }
            }
            FormInputKind::Toggle { value } => {
                let values = if value.is_empty() {
                    vec![String::new()]
                } else {
                    vec![String::new(), value.clone()]
                };
                selections.push((input.name.clone(), values));
            }
        }
    }

    let mut combos: Vec<BTreeMap<String, String>> = vec![base.clone()];
    'outer: for (name, values) in &selections {
        for value in values {
            let mut combo = base.clone();
            if !value.is_empty() {
                combo.insert(name.clone(), value.clone());
            }
            if !combos.contains(&combo) {
                combos.push(combo);
                if combos.len() >= max_combinations {
                    break 'outer;
                }
            }
        }
    }

    combos
        .into_iter()
        .map(|combo| combo.into_iter().collect())
        .collect()
}

/// Fetches configured pages, parses their forms and submits bounded
/// parameter enumerations, scanning every response for PDF URLs.
pub struct FormDiscoveryStrategy {
    config: FormDiscoveryConfig,
    filter: PatternFilter,
    rate_limiter: Arc<AdaptiveRateLimiter>,
    client: Option<reqwest::Client>,
}

impl FormDiscoveryStrategy {
    pub fn new(
        config: FormDiscoveryConfig,
        rate_limiter: Arc<AdaptiveRateLimiter>,
    ) -> Result<Self, CrawlError> {
        let filter = PatternFilter::compile(&config.include_patterns, &config.exclude_patterns)?;
        Ok(Self {
            config,
            filter,
            rate_limiter,
            client: None,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
        let Some(client) = &self.client else {
            return Err(CrawlError::Config("form client not initialized".into()));
        };
        self.rate_limiter.wait().await;
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CrawlError::Network(format!("HTTP {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))
    }

    async fn submit_and_scan(&self, form: &ParsedForm, budget: usize) -> Vec<String> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        let Ok(action_url) = Url::parse(&form.action) else {
            return Vec::new();
        };

        let mut pdfs = Vec::new();
        for params in enumerate_combinations(&form.inputs, budget) {
            self.rate_limiter.wait().await;
            let request = if form.method == "post" {
                client.post(&form.action).form(&params)
            } else {
                client.get(&form.action).query(&params)
            };
            match request.send().await {
                Ok(resp) => match resp.text().await {
                    Ok(html) => pdfs.extend(find_pdf_urls_with_base(&html, &action_url)),
                    Err(e) => debug!(action = %form.action, "form response unreadable: {e}"),
                },
                Err(e) => debug!(action = %form.action, "form submission failed: {e}"),
            }
        }
        pdfs
    }
}

#[async_trait]
impl SeedStrategy for FormDiscoveryStrategy {
    fn name(&self) -> &'static str {
        "form_discovery"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::FormSubmit
    }

    fn enabled(&self) -> bool {
        self.config.enabled && !self.config.seed_pages.is_empty()
    }

    async fn initialize(&mut self) -> Result<(), CrawlError> {
        if self.client.is_none() {
            self.client = Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(self.config.timeout_seconds))
                    .build()
                    .map_err(|e| CrawlError::Network(e.to_string()))?,
            );
        }
        Ok(())
    }

    async fn discover(&mut self) -> Result<StrategyResult, CrawlError> {
        let mut found = Vec::new();
        let mut submissions_left = self.config.max_combinations;

        for page_url in self.config.seed_pages.clone() {
            if submissions_left == 0 {
                break;
            }
            let Ok(base) = Url::parse(&page_url) else {
                warn!(url = %page_url, "unparseable form seed page");
                continue;
            };
            let html = match self.fetch(&page_url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url = %page_url, "form page fetch failed: {e}");
                    continue;
                }
            };

            for form in parse_forms(&html, &base) {
                if submissions_left == 0 {
                    break;
                }
                let pdfs = self.submit_and_scan(&form, submissions_left).await;
                submissions_left = submissions_left.saturating_sub(
                    enumerate_combinations(&form.inputs, submissions_left).len(),
                );
                found.extend(pdfs);
            }
        }

        let seed_urls = self.filter.apply(found);
        Ok(StrategyResult {
            metadata: serde_json::json!({
                "strategy": self.name(),
                "total_seeds": seed_urls.len(),
            }),
            seed_urls,
        })
    }

    async fn cleanup(&mut self) {
        self.client = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://site/search").unwrap()
    }

    #[test]
    fn parses_form_fields_and_resolves_action() {
        let html = r#"
            <form action="/results" method="POST">
                <input type="text" name="q" value="sentencia" />
                <select name="court">
                    <option value="supreme">Supreme</option>
                    <option value="appellate">Appellate</option>
                </select>
                <input type="checkbox" name="with_pdf" value="1" />
                <input type="submit" value="Go" />
            </form>
        "#;
        let forms = parse_forms(html, &base());
        assert_eq!(forms.len(), 1);
        let form = &forms[0];
        assert_eq!(form.action, "https://site/results");
        assert_eq!(form.method, "post");
        // The nameless submit button is not a field.
        assert_eq!(form.inputs.len(), 3);
        assert_eq!(
            form.inputs[1].kind,
            FormInputKind::Select {
                options: vec!["supreme".to_string(), "appellate".to_string()]
            }
        );
    }

    #[test]
    fn forms_without_action_are_ignored() {
        let forms = parse_forms("<form><input name='q'/></form>", &base());
        assert!(forms.is_empty());
    }

    #[test]
    fn enumeration_covers_defaults_selects_and_toggles() {
        let inputs = vec![
            FormInput {
                name: "q".to_string(),
                kind: FormInputKind::Text {
                    value: "default".to_string(),
                },
            },
            FormInput {
                name: "court".to_string(),
                kind: FormInputKind::Select {
                    options: vec!["a".to_string(), "b".to_string()],
                },
            },
            FormInput {
                name: "flag".to_string(),
                kind: FormInputKind::Toggle {
                    value: "1".to_string(),
                },
            },
        ];
        let combos = enumerate_combinations(&inputs, 100);
        // base, court=a, court=b, flag=1 (the absent-toggle combo equals base).
        assert_eq!(combos.len(), 4);
        assert!(combos
            .iter()
            .all(|c| c.iter().any(|(k, v)| k == "q" && v == "default")));
    }

    #[test]
    fn selects_are_capped_at_five_options() {
        let inputs = vec![FormInput {
            name: "year".to_string(),
            kind: FormInputKind::Select {
                options: (2000..2020).map(|y| y.to_string()).collect(),
            },
        }];
        let combos = enumerate_combinations(&inputs, 100);
        assert_eq!(combos.len(), 1 + SELECT_OPTION_CAP);
    }

    #[test]
    fn combination_budget_is_a_hard_cap() {
        let inputs = vec![
            FormInput {
                name: "a".to_string(),
                kind: FormInputKind::Select {
                    options: vec!["1".to_string(), "2".to_string(), "3".to_string()],
                },
            },
            FormInput {
                name: "b".to_string(),
                kind: FormInputKind::Select {
                    options: vec!["1".to_string(), "2".to_string(), "3".to_string()],
                },
            },
        ];
        let combos = enumerate_combinations(&inputs, 3);
        assert_eq!(combos.len(), 3);
    }
}
