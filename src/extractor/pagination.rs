/// Build the URL of a listing page. Page 1 is the base URL itself.
#[must_use]
pub fn listing_page_url(base_url: &str, page: u32) -> String {
    if page <= 1 {
        base_url.to_string()
    } else {
        format!("{}/page/{page}", base_url.trim_end_matches('/'))
    }
}

/// One listing page to visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub number: u32,
    pub url: String,
}

/// Finite sequence of listing pages, starting at page 1.
///
/// The walk normally ends at the first empty page; `max_pages` bounds it when
/// the site never serves one. Build a fresh value for each run.
#[derive(Debug, Clone)]
pub struct ListingPages {
    base_url: String,
    /// `None` once the page counter has run past `u32::MAX`.
    next: Option<u32>,
    max_pages: u32,
}

impl ListingPages {
    #[must_use]
    pub fn new(base_url: impl Into<String>, max_pages: u32) -> Self {
        Self {
            base_url: base_url.into(),
            next: Some(1),
            max_pages,
        }
    }

    /// Whether every page up to the cap has been handed out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.next.map_or(true, |next| next > self.max_pages)
    }
}

impl Iterator for ListingPages {
    type Item = ListingPage;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_exhausted() {
            return None;
        }
        let number = self.next?;
        self.next = number.checked_add(1);
        Some(ListingPage {
            number,
            url: listing_page_url(&self.base_url, number),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.next.map_or(0, |next| {
            (u64::from(self.max_pages) + 1).saturating_sub(u64::from(next)) as usize
        });
        (remaining, Some(remaining))
    }
}
