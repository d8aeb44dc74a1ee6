//! Firefox sessions driven through geckodriver with `fantoccini`.
//!
//! The session owns a single-threaded tokio runtime and blocks on each
//! command, so callers stay synchronous. It either spawns its own
//! geckodriver on a free local port or attaches to a server given by URL.
//! Dropping the session closes the browser and stops the spawned driver.

use std::collections::HashMap;
use std::future::Future;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::{poll_until, BrowserError, ElementRef, Locator, PageSession};
use crate::config::BrowserConfig;

/// How long geckodriver gets to accept a new session
const DRIVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

const DRIVER_STARTUP_POLL: Duration = Duration::from_millis(250);

/// Client-side ceiling for a single command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Browser-side page load ceiling, below [`COMMAND_TIMEOUT`]
const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(60);

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Emulates Selenium's `submit()`: submit the element's owning form.
const SUBMIT_SCRIPT: &str = "\
const el = arguments[0];
const form = el.form || el.closest('form');
if (!form) { throw new Error('element is not inside a form'); }
if (form.requestSubmit) { form.requestSubmit(); } else { form.submit(); }";

/// A live Firefox session.
pub struct WebDriverSession {
    runtime: Runtime,
    client: Option<Client>,
    driver: Option<Child>,
    /// Elements handed out since the last navigation
    elements: HashMap<String, Element>,
    next_element: usize,
}

impl WebDriverSession {
    /// Start (or attach to) a WebDriver server and open a Firefox session.
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        let (url, driver) = match &config.webdriver_url {
            Some(url) => (url.trim_end_matches('/').to_string(), None),
            None => {
                let path = config
                    .geckodriver_path
                    .as_deref()
                    .context("geckodriver path is required")?;
                let path = resolve_driver(path)?;
                let port = free_port()?;

                info!("Starting {} on port {}", path.display(), port);
                let child = Command::new(&path)
                    .arg("--port")
                    .arg(port.to_string())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .with_context(|| format!("Failed to start {}", path.display()))?;

                (format!("http://127.0.0.1:{}", port), Some(child))
            }
        };

        // From here on Drop stops the driver if anything fails
        let mut session = Self {
            runtime,
            client: None,
            driver,
            elements: HashMap::new(),
            next_element: 0,
        };

        let mut builder = ClientBuilder::native();
        builder.capabilities(firefox_capabilities(config));

        let mut last_error = None;
        let client = poll_until(DRIVER_STARTUP_TIMEOUT, DRIVER_STARTUP_POLL, || {
            let connect = tokio::time::timeout(DRIVER_STARTUP_TIMEOUT, builder.connect(&url));
            match session.runtime.block_on(connect) {
                Ok(Ok(client)) => Ok::<_, anyhow::Error>(Some(client)),
                Ok(Err(e)) => {
                    debug!("WebDriver at {} not ready: {}", url, e);
                    last_error = Some(e.to_string());
                    Ok(None)
                }
                Err(_) => {
                    last_error = Some("no response".to_string());
                    Ok(None)
                }
            }
        })?;

        let client = client.with_context(|| {
            format!(
                "Failed to create browser session at {}: {}",
                url,
                last_error.unwrap_or_default()
            )
        })?;
        session.client = Some(client);
        Ok(session)
    }

    fn client(&self) -> Result<Client, BrowserError> {
        self.client
            .clone()
            .ok_or_else(|| BrowserError::Session("no active session".to_string()))
    }

    fn element(&self, element: &ElementRef) -> Result<Element, BrowserError> {
        self.elements
            .get(&element.0)
            .cloned()
            .ok_or_else(|| BrowserError::StaleElement(element.0.clone()))
    }

    fn remember(&mut self, element: Element) -> ElementRef {
        let id = format!("e{}", self.next_element);
        self.next_element += 1;
        self.elements.insert(id.clone(), element);
        ElementRef(id)
    }

    fn run<T, F>(&self, what: &str, command: F) -> Result<T, BrowserError>
    where
        F: Future<Output = Result<T, CmdError>>,
    {
        drive(&self.runtime, COMMAND_TIMEOUT, what, command)
    }

    /// Close the browser and stop the spawned driver. Safe to call twice.
    pub fn shutdown(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = drive(&self.runtime, COMMAND_TIMEOUT, "close session", client.close()) {
                warn!("Failed to close browser session: {}", e);
            }
        }

        if let Some(mut child) = self.driver.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PageSession for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let client = self.client()?;
        self.elements.clear();
        self.run(url, client.goto(url))
    }

    fn current_url(&mut self) -> Result<String, BrowserError> {
        let client = self.client()?;
        let url = self.run("current url", client.current_url())?;
        Ok(url.to_string())
    }

    fn find_all(&mut self, locator: Locator) -> Result<Vec<ElementRef>, BrowserError> {
        let client = self.client()?;
        let css = locator.css();
        let found = self.run(&css, client.find_all(fantoccini::Locator::Css(&css)))?;
        Ok(found.into_iter().map(|e| self.remember(e)).collect())
    }

    fn find_child(&mut self, parent: &ElementRef, locator: Locator) -> Result<ElementRef, BrowserError> {
        let parent = self.element(parent)?;
        let css = locator.css();
        let child = self.run(&css, parent.find(fantoccini::Locator::Css(&css)))?;
        Ok(self.remember(child))
    }

    fn text(&mut self, element: &ElementRef) -> Result<String, BrowserError> {
        let e = self.element(element)?;
        self.run("text", e.text())
    }

    fn property(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError> {
        let e = self.element(element)?;
        self.run(name, e.prop(name))
    }

    fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        let e = self.element(element)?;
        self.run("click", e.click())
    }

    fn clear(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        let e = self.element(element)?;
        self.run("clear", e.clear())
    }

    fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
        let e = self.element(element)?;
        self.run("send keys", e.send_keys(text))
    }

    fn submit(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        let client = self.client()?;
        let e = self.element(element)?;
        let arg = serde_json::to_value(&e).map_err(|e| BrowserError::Protocol {
            code: "invalid argument".to_string(),
            message: e.to_string(),
        })?;
        self.run("submit", client.execute(SUBMIT_SCRIPT, vec![arg]))?;
        Ok(())
    }

    fn scroll_to_bottom(&mut self) -> Result<(), BrowserError> {
        let client = self.client()?;
        self.run("scroll", client.execute(SCROLL_SCRIPT, Vec::new()))?;
        Ok(())
    }

    fn close_extra_windows(&mut self) -> Result<(), BrowserError> {
        let client = self.client()?;
        let handles = self.run("window handles", client.windows())?;

        let Some((first, rest)) = handles.split_first() else {
            return Ok(());
        };

        for handle in rest {
            self.run("switch window", client.switch_to_window(handle.clone()))?;
            self.run("close window", client.close_window())?;
        }
        self.run("switch window", client.switch_to_window(first.clone()))
    }
}

/// Block on one command with a client-side deadline.
///
/// Hitting the deadline fails only this command; the session stays usable.
fn drive<T, F>(runtime: &Runtime, limit: Duration, what: &str, command: F) -> Result<T, BrowserError>
where
    F: Future<Output = Result<T, CmdError>>,
{
    match runtime.block_on(tokio::time::timeout(limit, command)) {
        Ok(result) => result.map_err(map_error),
        Err(_) => Err(BrowserError::Timeout {
            what: what.to_string(),
            elapsed: limit,
        }),
    }
}

fn map_error(err: CmdError) -> BrowserError {
    match err {
        CmdError::Standard(wd) => {
            map_status(&wd.error, wd.message.to_string())
        }
        CmdError::WaitTimeout => BrowserError::Timeout {
            what: "condition".to_string(),
            elapsed: Duration::ZERO,
        },
        CmdError::Lost(e) if e.kind() == std::io::ErrorKind::TimedOut => BrowserError::Timeout {
            what: e.to_string(),
            elapsed: Duration::ZERO,
        },
        CmdError::Lost(e) => BrowserError::Session(e.to_string()),
        other => BrowserError::Protocol {
            code: "client".to_string(),
            message: other.to_string(),
        },
    }
}

fn map_status(status: &ErrorStatus, message: String) -> BrowserError {
    match status {
        ErrorStatus::NoSuchElement => BrowserError::ElementNotFound(message),
        ErrorStatus::StaleElementReference => BrowserError::StaleElement(message),
        ErrorStatus::ElementNotInteractable | ErrorStatus::ElementClickIntercepted => {
            BrowserError::NotInteractable(message)
        }
        ErrorStatus::Timeout | ErrorStatus::ScriptTimeout => BrowserError::Timeout {
            what: message,
            elapsed: Duration::ZERO,
        },
        ErrorStatus::InvalidSessionId | ErrorStatus::SessionNotCreated | ErrorStatus::NoSuchWindow => {
            BrowserError::Session(message)
        }
        other => BrowserError::Protocol {
            code: format!("{:?}", other),
            message,
        },
    }
}

/// Firefox capabilities: headless flag, command timeouts and download directory.
fn firefox_capabilities(config: &BrowserConfig) -> serde_json::Map<String, Value> {
    let mut args = Vec::new();
    if config.headless {
        args.push("-headless");
    }

    let mut prefs = serde_json::Map::new();
    if let Some(dir) = &config.download_dir {
        let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.clone());
        prefs.insert("browser.download.folderList".into(), json!(2));
        prefs.insert("browser.download.useDownloadDir".into(), json!(true));
        prefs.insert("browser.download.dir".into(), json!(dir.to_string_lossy()));
    }

    let mut caps = serde_json::Map::new();
    caps.insert("browserName".into(), json!("firefox"));
    caps.insert(
        "timeouts".into(),
        json!({
            "pageLoad": PAGE_LOAD_TIMEOUT.as_millis() as u64,
            "script": SCRIPT_TIMEOUT.as_millis() as u64,
        }),
    );
    caps.insert("moz:firefoxOptions".into(), json!({ "args": args, "prefs": prefs }));
    caps
}

/// Bare names (`geckodriver`) are looked up on PATH.
fn resolve_driver(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    which::which(path).with_context(|| format!("geckodriver not found: {}", path.display()))
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to find a free local port")?;
    Ok(listener.local_addr()?.port())
}
