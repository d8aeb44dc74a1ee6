//! Browser capability used by the crawler and the download workflow.
//!
//! [`PageSession`] is the narrow set of page operations the rest of the
//! crate relies on (navigate, find, read, click, type, submit, scroll). The
//! production implementation drives Firefox through geckodriver
//! ([`webdriver::WebDriverSession`]); tests use an in-memory fake.

pub mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// How to find an element on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Single CSS class name (`game_cell`)
    ClassName(&'static str),
    /// Tag name (`img`)
    TagName(&'static str),
}

impl Locator {
    /// Equivalent CSS selector.
    pub fn css(&self) -> String {
        match self {
            Locator::ClassName(name) => format!(".{}", name),
            Locator::TagName(tag) => tag.to_string(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::ClassName(name) => write!(f, "class '{}'", name),
            Locator::TagName(tag) => write!(f, "tag '{}'", tag),
        }
    }
}

/// Opaque handle to an element in the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Browser interaction errors
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("WebDriver error '{code}': {message}")]
    Protocol { code: String, message: String },

    #[error("Browser session unavailable: {0}")]
    Session(String),
}

impl BrowserError {
    /// Whether the session itself is gone, as opposed to one page step failing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::Session(_))
    }
}

/// Page operations needed by the crawler and the checkout workflow.
///
/// All calls act on the single current page and are issued one at a time.
pub trait PageSession {
    /// Load `url` in the current window.
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    fn current_url(&mut self) -> Result<String, BrowserError>;

    /// All elements matching `locator`, in document order.
    fn find_all(&mut self, locator: Locator) -> Result<Vec<ElementRef>, BrowserError>;

    /// First descendant of `parent` matching `locator`.
    fn find_child(&mut self, parent: &ElementRef, locator: Locator) -> Result<ElementRef, BrowserError>;

    /// Rendered text of an element.
    fn text(&mut self, element: &ElementRef) -> Result<String, BrowserError>;

    /// DOM property of an element (`href` and `src` come back absolute).
    fn property(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError>;

    fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError>;

    fn clear(&mut self, element: &ElementRef) -> Result<(), BrowserError>;

    fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError>;

    /// Submit the form that owns `element`.
    fn submit(&mut self, element: &ElementRef) -> Result<(), BrowserError>;

    /// Scroll to the bottom of the page to trigger lazy loading.
    fn scroll_to_bottom(&mut self) -> Result<(), BrowserError>;

    /// Close every window except the first and switch back to it.
    fn close_extra_windows(&mut self) -> Result<(), BrowserError>;

    /// First element matching `locator`.
    fn find(&mut self, locator: Locator) -> Result<ElementRef, BrowserError> {
        self.find_all(locator)?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::ElementNotFound(locator.to_string()))
    }

    /// Poll until an element matching `locator` is present.
    fn wait_for(&mut self, locator: Locator, timeout: Duration, interval: Duration) -> Result<ElementRef, BrowserError> {
        let start = Instant::now();
        let found = poll_until(timeout, interval, || match self.find_all(locator) {
            Ok(found) => Ok(found.into_iter().next()),
            Err(e) if e.is_fatal() => Err(e),
            Err(_) => Ok(None),
        })?;

        found.ok_or_else(|| BrowserError::Timeout {
            what: locator.to_string(),
            elapsed: start.elapsed(),
        })
    }
}

/// Call `check` every `interval` until it yields `Some` or `timeout` elapses.
///
/// The check always runs at least once. Errors from the check end the wait
/// immediately.
pub fn poll_until<T, E, F>(timeout: Duration, interval: Duration, mut check: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = check()? {
            return Ok(Some(value));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        thread::sleep(interval.min(timeout.saturating_sub(start.elapsed())));
    }
}
