use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::site::ListingPage;

/// Filesystem layout produced by a crawl: one subdirectory per country under
/// the parent directory, one file per mirrored listing. Country directories
/// are created lazily, on the first listing written into them.
#[derive(Debug)]
pub struct PageStore {
    parent_dir: PathBuf,
}

impl PageStore {
    pub fn new(parent_dir: impl Into<PathBuf>) -> Result<Self> {
        let parent_dir = parent_dir.into();
        fs::create_dir_all(&parent_dir).with_context(|| {
            format!("cannot create parent directory {}", parent_dir.display())
        })?;
        let meta = fs::metadata(&parent_dir)?;
        if meta.permissions().readonly() {
            bail!("parent directory {} is not writable", parent_dir.display());
        }
        Ok(Self { parent_dir })
    }

    pub fn listing_path(&self, listing: &ListingPage) -> PathBuf {
        self.parent_dir
            .join(dir_name(&listing.country))
            .join(&listing.file_name)
    }

    pub fn contains(&self, listing: &ListingPage) -> bool {
        self.listing_path(listing).exists()
    }

    pub fn write(&self, listing: &ListingPage, content: &str) -> Result<PathBuf> {
        let path = self.listing_path(listing);
        let country_dir = path
            .parent()
            .expect("listing path always has a country directory");
        fs::create_dir_all(country_dir)
            .with_context(|| format!("cannot create directory {}", country_dir.display()))?;
        fs::write(&path, content)
            .with_context(|| format!("cannot write listing file {}", path.display()))?;
        Ok(path)
    }
}

/// Country labels become directory names as-is, except for path separators.
fn dir_name(country: &str) -> String {
    country.trim().replace(['/', '\\'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(country: &str, file_name: &str) -> ListingPage {
        ListingPage {
            url: format!("https://data.portal.test/{file_name}"),
            country: country.into(),
            file_name: file_name.into(),
        }
    }

    #[test]
    fn creates_country_dir_on_first_write() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::new(tmp.path().join("mirror")).unwrap();

        let france = tmp.path().join("mirror").join("France");
        assert!(!france.exists());

        let path = store.write(&listing("France", "antibes.csv"), "id\n1\n").unwrap();
        assert_eq!(path, france.join("antibes.csv"));
        assert_eq!(fs::read_to_string(path).unwrap(), "id\n1\n");
    }

    #[test]
    fn reports_already_mirrored_listings() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::new(tmp.path()).unwrap();

        let l = listing("Japan", "kyoto.csv");
        assert!(!store.contains(&l));
        store.write(&l, "id\n").unwrap();
        assert!(store.contains(&l));
    }

    #[test]
    fn country_labels_cannot_escape_their_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PageStore::new(tmp.path()).unwrap();

        let path = store.listing_path(&listing("Bosnia/Herzegovina", "sarajevo.csv"));
        assert_eq!(
            path,
            tmp.path().join("Bosnia-Herzegovina").join("sarajevo.csv")
        );
    }
}
