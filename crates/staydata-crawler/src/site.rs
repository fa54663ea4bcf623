use std::collections::HashSet;

use anyhow::{anyhow, Result};
use select::document::Document;
use select::predicate::{Class, Name, Predicate};
use url::Url;

/// A per-country section of the portal, discovered in the root index
/// navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountrySection {
    pub name: String,
    pub url: String,
}

/// A single listing page, discovered in a country's listing index. The
/// country label decides the directory the payload is written into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub url: String,
    pub country: String,
    pub file_name: String,
}

/// Extracts the per-country sections from the root index page.
pub fn parse_countries(page_url: &str, page: &str) -> Result<Vec<CountrySection>> {
    let base = Url::parse(page_url)?;
    let document = Document::from(page);

    let mut sections = vec![];
    for node in document.find(Class("country-nav").descendant(Name("a"))) {
        let name = node.text().trim().to_string();
        let href = match node.attr("href") {
            Some(href) => href,
            None => {
                log::warn!("country link without href in {page_url}");
                continue;
            }
        };
        if name.is_empty() {
            log::warn!("unnamed country link {href} in {page_url}");
            continue;
        }
        match base.join(href) {
            Ok(url) => {
                log::info!("discovered country section {name} -> {url}");
                sections.push(CountrySection {
                    name,
                    url: url.into(),
                });
            }
            Err(e) => log::warn!("unusable country href {href} in {page_url}: {e}"),
        }
    }

    if sections.is_empty() {
        return Err(anyhow!("no country sections found in {page_url}"));
    }
    Ok(sections)
}

/// Extracts the listing links from a country's listing index page.
/// Duplicate links are dropped, each listing is fetched at most once per run.
pub fn parse_listings(country: &CountrySection, page: &str) -> Result<Vec<ListingPage>> {
    let base = Url::parse(&country.url)?;
    let document = Document::from(page);

    let mut seen = HashSet::new();
    let mut listings = vec![];
    for node in document.find(Class("listings").descendant(Name("a"))) {
        let href = match node.attr("href") {
            Some(href) => href,
            None => {
                log::warn!("listing link without href in {}", country.url);
                continue;
            }
        };
        let url = match base.join(href) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("unusable listing href {href} in {}: {e}", country.url);
                continue;
            }
        };
        let file_name = match listing_file_name(&url) {
            Some(name) => name,
            None => {
                log::warn!("cannot derive a file name for listing {url}");
                continue;
            }
        };
        if !seen.insert(url.to_string()) {
            continue;
        }
        log::info!("discovered listing {url} [{}]", country.name);
        listings.push(ListingPage {
            url: url.into(),
            country: country.name.clone(),
            file_name,
        });
    }

    if listings.is_empty() {
        return Err(anyhow!(
            "no listings found for {} at {}",
            country.name,
            country.url
        ));
    }
    Ok(listings)
}

/// Output file name for a listing: last URL path segment, with the `.gz`
/// suffix dropped since payloads are stored decompressed, and `.html`
/// appended when the segment carries no extension.
fn listing_file_name(url: &Url) -> Option<String> {
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let name = last.strip_suffix(".gz").unwrap_or(last);
    if name.contains('.') {
        Some(name.to_string())
    } else {
        Some(format!("{name}.html"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_URL: &str = "https://portal.test/get-the-data/";

    fn section(name: &str, url: &str) -> CountrySection {
        CountrySection {
            name: name.into(),
            url: url.into(),
        }
    }

    #[test]
    fn finds_country_sections() {
        let page = r#"<html><body>
            <nav class="country-nav">
              <a href="/france/">France</a>
              <a href="https://portal.test/japan/">Japan</a>
            </nav>
        </body></html>"#;

        let sections = parse_countries(ROOT_URL, page).unwrap();
        assert_eq!(
            sections,
            vec![
                section("France", "https://portal.test/france/"),
                section("Japan", "https://portal.test/japan/"),
            ]
        );
    }

    #[test]
    fn missing_navigation_is_an_error() {
        let page = "<html><body><p>maintenance</p></body></html>";
        assert!(parse_countries(ROOT_URL, page).is_err());
    }

    #[test]
    fn finds_listing_links_and_dedups() {
        let country = section("France", "https://portal.test/france/");
        let page = r#"<ul class="listings">
            <li><a href="https://data.portal.test/france/antibes.csv.gz">Antibes</a></li>
            <li><a href="/france/bordeaux">Bordeaux</a></li>
            <li><a href="https://data.portal.test/france/antibes.csv.gz">Antibes again</a></li>
        </ul>"#;

        let listings = parse_listings(&country, page).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].url, "https://data.portal.test/france/antibes.csv.gz");
        assert_eq!(listings[0].country, "France");
        assert_eq!(listings[0].file_name, "antibes.csv");
        assert_eq!(listings[1].url, "https://portal.test/france/bordeaux");
        assert_eq!(listings[1].file_name, "bordeaux.html");
    }

    #[test]
    fn empty_country_page_is_an_error() {
        let country = section("France", "https://portal.test/france/");
        assert!(parse_listings(&country, "<html><body/></html>").is_err());
    }
}
