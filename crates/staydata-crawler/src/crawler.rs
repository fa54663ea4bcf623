use anyhow::Result;
use futures::{stream, StreamExt};

use crate::config::{CrawlerConfig, OnError};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::site::{self, ListingPage};
use crate::store::PageStore;

/// Outcome of a crawl, printed by the CLI. Per-item failures end up in
/// `listings_failed`/`countries_skipped` and never fail the run unless the
/// error policy is [`OnError::Fail`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub countries: usize,
    pub countries_skipped: usize,
    pub listings_written: usize,
    pub listings_skipped: usize,
    pub listings_failed: usize,
}

enum Persisted {
    Written,
    AlreadyStored,
}

enum MirrorFailure {
    Fetch(anyhow::Error),
    // Filesystem failures abort the run, downstream writes are impossible.
    Store(anyhow::Error),
}

/// Walks the portal starting from `config.root_url` and mirrors every
/// discovered listing into the store.
pub async fn crawl_site(config: &CrawlerConfig, store: &PageStore) -> Result<CrawlStats> {
    let fetcher = HttpFetcher::new(config.user_agent.clone());
    crawl_with(config, store, &fetcher).await
}

/// Same as [`crawl_site`] with an injected page [`Fetcher`].
pub async fn crawl_with<F>(config: &CrawlerConfig, store: &PageStore, fetcher: &F) -> Result<CrawlStats>
where
    F: Fetcher,
{
    let mut stats = CrawlStats::default();

    // Root index

    let index = match fetcher.fetch(&config.root_url).await {
        Ok(page) => page,
        Err(e) => match config.on_dl_error {
            OnError::SkipAndLog => {
                log::error!("cannot fetch root index {}: {e:#}", config.root_url);
                return Ok(stats);
            }
            OnError::Fail => {
                return Err(e.context(format!("cannot fetch root index {}", config.root_url)))
            }
        },
    };

    let countries = match site::parse_countries(&config.root_url, &index) {
        Ok(countries) => countries,
        Err(e) => match config.on_parse_error {
            OnError::SkipAndLog => {
                log::error!("{e:#}");
                return Ok(stats);
            }
            OnError::Fail => return Err(e),
        },
    };

    // Country sections

    for country in countries {
        let page = match fetcher.fetch(&country.url).await {
            Ok(page) => page,
            Err(e) => match config.on_dl_error {
                OnError::SkipAndLog => {
                    log::warn!("skipping country {}: {e:#}", country.name);
                    stats.countries_skipped += 1;
                    continue;
                }
                OnError::Fail => {
                    return Err(e.context(format!("cannot fetch country index {}", country.url)))
                }
            },
        };

        let listings = match site::parse_listings(&country, &page) {
            Ok(listings) => listings,
            Err(e) => match config.on_parse_error {
                OnError::SkipAndLog => {
                    log::warn!("skipping country {}: {e:#}", country.name);
                    stats.countries_skipped += 1;
                    continue;
                }
                OnError::Fail => return Err(e),
            },
        };
        stats.countries += 1;

        // Listings

        let outcomes = stream::iter(listings)
            .map(|listing| async move {
                let outcome = mirror_listing(store, fetcher, &listing).await;
                (listing, outcome)
            })
            .buffer_unordered(config.concurrent_downloads)
            .collect::<Vec<_>>()
            .await;

        for (listing, outcome) in outcomes {
            match outcome {
                Ok(Persisted::Written) => stats.listings_written += 1,
                Ok(Persisted::AlreadyStored) => stats.listings_skipped += 1,
                Err(MirrorFailure::Fetch(e)) => match config.on_dl_error {
                    OnError::SkipAndLog => {
                        log::warn!("skipping listing {}: {e:#}", listing.url);
                        stats.listings_failed += 1;
                    }
                    OnError::Fail => {
                        return Err(e.context(format!("failed on listing {}", listing.url)))
                    }
                },
                Err(MirrorFailure::Store(e)) => {
                    return Err(e.context(format!("cannot persist listing {}", listing.url)))
                }
            }
        }
    }

    log::info!(
        "crawl finished: {} countries ({} skipped), {} listings written, {} already mirrored, {} failed",
        stats.countries,
        stats.countries_skipped,
        stats.listings_written,
        stats.listings_skipped,
        stats.listings_failed,
    );
    Ok(stats)
}

async fn mirror_listing<F>(
    store: &PageStore,
    fetcher: &F,
    listing: &ListingPage,
) -> Result<Persisted, MirrorFailure>
where
    F: Fetcher,
{
    if store.contains(listing) {
        log::info!("already mirrored {}, skipping", listing.url);
        return Ok(Persisted::AlreadyStored);
    }

    let content = fetcher
        .fetch(&listing.url)
        .await
        .map_err(MirrorFailure::Fetch)?;
    let path = store.write(listing, &content).map_err(MirrorFailure::Store)?;
    log::info!("mirrored {} -> {}", listing.url, path.display());
    Ok(Persisted::Written)
}
