//! Scripted in-memory page for crawler and download tests.

use std::collections::{HashMap, VecDeque};

use super::{BrowserError, ElementRef, Locator, PageSession};

/// One listing entry; `None` fields have no matching child element.
#[derive(Debug, Clone, Default)]
pub struct FakeCell {
    pub title: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
}

impl FakeCell {
    /// Entry with every field present, derived from `n`.
    pub fn numbered(n: usize) -> Self {
        Self {
            title: Some(format!("Pack {}", n)),
            author: Some(format!("Author {}", n)),
            text: Some(format!("Sprites number {}", n)),
            link: Some(format!("https://example.itch.io/pack-{}", n)),
            image: Some(format!("https://img.example/{}.png", n)),
        }
    }
}

/// How a product page behaves during checkout.
#[derive(Debug, Clone)]
pub struct FakeCheckout {
    /// One entry per `buy_btn`; `false` means clicking it is refused
    pub buy_buttons: Vec<bool>,
    pub money_input: bool,
    pub download_button: bool,
    pub confirmation: bool,
}

impl FakeCheckout {
    pub fn working() -> Self {
        Self {
            buy_buttons: vec![true],
            money_input: true,
            download_button: true,
            confirmation: true,
        }
    }
}

#[derive(Debug, Default)]
enum Stage {
    #[default]
    Blank,
    Listing,
    Checkout {
        url: String,
        bought: bool,
        submitted: bool,
        downloaded: bool,
    },
}

#[derive(Debug, Default)]
pub struct FakeBrowser {
    /// Full listing, revealed progressively
    pub cells: Vec<FakeCell>,
    /// Entries visible right after navigation
    pub initially_visible: usize,
    /// How many entries each scroll reveals; an empty queue reveals nothing
    pub reveals: VecDeque<usize>,
    /// Product pages by URL; any other URL loads the listing
    pub checkouts: HashMap<String, FakeCheckout>,
    /// Navigating here reports a lost session
    pub lose_session_at: Option<String>,

    /// Every call, in order
    pub log: Vec<String>,
    /// Product pages whose download button was clicked
    pub downloads: Vec<String>,
    /// Text typed into the price field
    pub typed: Vec<String>,
    pub scrolls: usize,

    visible: usize,
    stage: Stage,
}

impl FakeBrowser {
    pub fn listing(cells: Vec<FakeCell>, initially_visible: usize, reveals: &[usize]) -> Self {
        Self {
            cells,
            initially_visible,
            reveals: reveals.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn shop(checkouts: impl IntoIterator<Item = (String, FakeCheckout)>) -> Self {
        Self {
            checkouts: checkouts.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Number of `navigate` calls made
    pub fn navigations(&self) -> usize {
        self.log.iter().filter(|l| l.starts_with("navigate ")).count()
    }

    fn checkout_state(&self) -> Option<(&FakeCheckout, bool, bool, bool)> {
        match &self.stage {
            Stage::Checkout {
                url,
                bought,
                submitted,
                downloaded,
            } => self.checkouts.get(url).map(|c| (c, *bought, *submitted, *downloaded)),
            _ => None,
        }
    }

    fn cell<'e>(&self, element: &'e ElementRef) -> Result<(usize, &'e str), BrowserError> {
        let stale = || BrowserError::StaleElement(element.0.clone());
        let rest = element.0.strip_prefix("cell-").ok_or_else(stale)?;
        let (index, field) = rest.split_once('/').unwrap_or((rest, ""));
        let index: usize = index.parse().map_err(|_| stale())?;
        if index >= self.visible {
            return Err(stale());
        }
        Ok((index, field))
    }
}

fn field_of<'a>(cell: &'a FakeCell, field: &str) -> Option<&'a String> {
    match field {
        "game_title" => cell.title.as_ref(),
        "game_author" => cell.author.as_ref(),
        "game_text" => cell.text.as_ref(),
        "game_link" => cell.link.as_ref(),
        "img" => cell.image.as_ref(),
        _ => None,
    }
}

fn refs(ids: impl IntoIterator<Item = String>) -> Vec<ElementRef> {
    ids.into_iter().map(ElementRef).collect()
}

impl PageSession for FakeBrowser {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.log.push(format!("navigate {}", url));
        if self.lose_session_at.as_deref() == Some(url) {
            return Err(BrowserError::Session("browser went away".into()));
        }

        self.stage = if self.checkouts.contains_key(url) {
            Stage::Checkout {
                url: url.to_string(),
                bought: false,
                submitted: false,
                downloaded: false,
            }
        } else {
            self.visible = self.initially_visible.min(self.cells.len());
            Stage::Listing
        };
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(match &self.stage {
            Stage::Checkout { url, .. } => url.clone(),
            _ => "about:blank".to_string(),
        })
    }

    fn find_all(&mut self, locator: Locator) -> Result<Vec<ElementRef>, BrowserError> {
        self.log.push(format!("find_all {}", locator.css()));
        let Locator::ClassName(class) = locator else {
            return Ok(Vec::new());
        };

        if let Stage::Listing = self.stage {
            return Ok(match class {
                "game_cell" => refs((0..self.visible).map(|i| format!("cell-{}", i))),
                _ => Vec::new(),
            });
        }

        let Some((checkout, bought, submitted, downloaded)) = self.checkout_state() else {
            return Ok(Vec::new());
        };
        let found = match class {
            "buy_btn" => refs((0..checkout.buy_buttons.len()).map(|i| format!("buy-{}", i))),
            "money_input" if bought && checkout.money_input => refs(["money".to_string()]),
            "download_btn" if submitted && checkout.download_button => refs(["download".to_string()]),
            "after_download_lightbox_widget" if downloaded && checkout.confirmation => {
                refs(["lightbox".to_string()])
            }
            _ => Vec::new(),
        };
        Ok(found)
    }

    fn find_child(&mut self, parent: &ElementRef, locator: Locator) -> Result<ElementRef, BrowserError> {
        let (index, _) = self.cell(parent)?;
        let field = match locator {
            Locator::ClassName(name) | Locator::TagName(name) => name,
        };
        match field_of(&self.cells[index], field) {
            Some(_) => Ok(ElementRef(format!("cell-{}/{}", index, field))),
            None => Err(BrowserError::ElementNotFound(locator.to_string())),
        }
    }

    fn text(&mut self, element: &ElementRef) -> Result<String, BrowserError> {
        let (index, field) = self.cell(element)?;
        field_of(&self.cells[index], field)
            .cloned()
            .ok_or_else(|| BrowserError::StaleElement(element.0.clone()))
    }

    fn property(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError> {
        let (index, field) = self.cell(element)?;
        let value = match (field, name) {
            ("game_link", "href") | ("img", "src") => field_of(&self.cells[index], field).cloned(),
            _ => None,
        };
        Ok(value)
    }

    fn click(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        self.log.push(format!("click {}", element.0));
        let Stage::Checkout {
            url,
            bought,
            submitted,
            downloaded,
        } = &mut self.stage
        else {
            return Err(BrowserError::StaleElement(element.0.clone()));
        };
        let Some(checkout) = self.checkouts.get(url.as_str()) else {
            return Err(BrowserError::StaleElement(element.0.clone()));
        };

        if let Some(index) = element.0.strip_prefix("buy-") {
            let index: usize = index
                .parse()
                .map_err(|_| BrowserError::StaleElement(element.0.clone()))?;
            if !checkout.buy_buttons.get(index).copied().unwrap_or(false) {
                return Err(BrowserError::NotInteractable(element.0.clone()));
            }
            *bought = true;
        } else if element.0 == "download" && *submitted {
            *downloaded = true;
            self.downloads.push(url.clone());
        }
        Ok(())
    }

    fn clear(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        self.log.push(format!("clear {}", element.0));
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<(), BrowserError> {
        self.log.push(format!("send_keys {} {}", element.0, text));
        self.typed.push(text.to_string());
        Ok(())
    }

    fn submit(&mut self, element: &ElementRef) -> Result<(), BrowserError> {
        self.log.push(format!("submit {}", element.0));
        if let Stage::Checkout { submitted, .. } = &mut self.stage {
            *submitted = true;
        }
        Ok(())
    }

    fn scroll_to_bottom(&mut self) -> Result<(), BrowserError> {
        self.log.push("scroll".to_string());
        self.scrolls += 1;
        if let Some(more) = self.reveals.pop_front() {
            self.visible = (self.visible + more).min(self.cells.len());
        }
        Ok(())
    }

    fn close_extra_windows(&mut self) -> Result<(), BrowserError> {
        self.log.push("close_extra_windows".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_fields_follow_visibility() -> Result<(), BrowserError> {
        let mut page = FakeBrowser::listing(vec![FakeCell::numbered(0), FakeCell::numbered(1)], 1, &[1]);
        page.navigate("https://example.itch.io/listing")?;

        let cells = page.find_all(Locator::ClassName("game_cell"))?;
        assert_eq!(cells.len(), 1);
        let link = page.find_child(&cells[0], Locator::ClassName("game_link"))?;
        assert_eq!(
            page.property(&link, "href")?.as_deref(),
            Some("https://example.itch.io/pack-0")
        );

        let hidden = ElementRef("cell-1/game_title".to_string());
        assert!(matches!(page.text(&hidden), Err(BrowserError::StaleElement(_))));
        page.scroll_to_bottom()?;
        assert_eq!(page.text(&hidden)?, "Pack 1");
        Ok(())
    }
}
