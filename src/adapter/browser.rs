//! Chrome adapter for the live duplicates queue, driven over CDP.
//!
//! Every interaction is a small script evaluated in the page, so the
//! selectors from `[browser.selectors]` are the only markup knowledge here.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig as CdpConfig, Page};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{RawRecord, UiAdapter};
use crate::config::{BrowserConfig, Selectors};
use crate::error::UiError;
use crate::policy::Side;

/// A queue row, addressed by its position among reviewable rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserRow {
    index: usize,
}

/// The comparison modal opened from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserModal {
    row: usize,
}

pub struct ChromeQueue {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    config: BrowserConfig,
}

impl ChromeQueue {
    /// Launch Chrome, open the queue, and wait for the user to log in.
    pub async fn launch(config: BrowserConfig) -> Result<Self, UiError> {
        let mut builder = CdpConfig::builder().viewport(None);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(dir) = &config.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        let cdp_config = builder
            .build()
            .map_err(|e| UiError::QueueUnavailable(format!("bad browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| UiError::QueueUnavailable(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("browser handler event error");
                }
            }
        });

        let page = browser
            .new_page(config.url.as_str())
            .await
            .map_err(|e| UiError::QueueUnavailable(format!("failed to open {}: {e}", config.url)))?;

        let queue = Self {
            browser: Mutex::new(browser),
            page,
            handler,
            config,
        };
        queue.wait_for_login().await?;
        Ok(queue)
    }

    /// Close the browser.
    pub async fn close(self) -> Result<(), UiError> {
        let mut browser = self.browser.into_inner();
        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| UiError::Action(format!("failed to close browser: {e}")));
        self.handler.abort();
        closed
    }

    fn selectors(&self) -> &Selectors {
        &self.config.selectors
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(10))
    }

    async fn wait_for_login(&self) -> Result<(), UiError> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.login_timeout_ms);
        let script = "document.readyState === 'complete' \
                      && window.location.href.includes('duplicates') \
                      && !window.location.href.includes('login')"
            .to_string();
        info!(url = %self.config.url, "waiting for the duplicates queue, log in if prompted");

        loop {
            // Navigation during login tears down the execution context.
            if let Ok(true) = self.eval::<bool>(script.clone()).await {
                info!("duplicates queue loaded");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(UiError::QueueUnavailable(format!(
                    "queue not reached within {}ms, login incomplete?",
                    self.config.login_timeout_ms
                )));
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, UiError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| UiError::Action(format!("page script failed: {e}")))?
            .into_value()
            .map_err(|e| UiError::Action(format!("unexpected page script result: {e}")))
    }

    /// Evaluate `check` until it yields true.
    ///
    /// Unbounded; the controller's step timeout limits it.
    async fn wait_until(&self, check: String) -> Result<(), UiError> {
        loop {
            if self.eval::<bool>(check.clone()).await? {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    /// Script prelude defining `rows()` and `cards()` for the page.
    fn prelude(&self) -> String {
        let s = self.selectors();
        format!(
            "const rows = () => Array.from(document.querySelectorAll({row})).filter(r => r.querySelector({review}));\n\
             const cards = () => Array.from(document.querySelectorAll({cards}));\n\
             const text = (root, sel) => {{ const el = root.querySelector(sel); return el ? el.textContent.trim() : null; }};\n",
            row = js_str(&s.row),
            review = js_str(&s.review_button),
            cards = js_str(&s.cards),
        )
    }

    fn script(&self, body: &str) -> String {
        format!("(() => {{\n{}{}\n}})()", self.prelude(), body)
    }

    fn modal_open_check(&self) -> String {
        format!("document.querySelector({}) !== null", js_str(&self.selectors().modal))
    }

    async fn click(&self, what: &str, body: &str) -> Result<(), UiError> {
        let clicked: bool = self.eval(self.script(body)).await?;
        if clicked {
            Ok(())
        } else {
            Err(UiError::NotReady(what.to_string()))
        }
    }
}

#[async_trait]
impl UiAdapter for ChromeQueue {
    type Row = BrowserRow;
    type Modal = BrowserModal;

    fn name(&self) -> &str {
        "chrome"
    }

    async fn count_pending(&self) -> Result<usize, UiError> {
        self.eval::<usize>(self.script("return rows().length;"))
            .await
            .map_err(|e| UiError::QueueUnavailable(e.to_string()))
    }

    async fn locate_next_row(&self, offset: usize) -> Result<Option<BrowserRow>, UiError> {
        let present: bool = self
            .eval(self.script(&format!("return rows().length > {offset};")))
            .await
            .map_err(|e| UiError::QueueUnavailable(e.to_string()))?;
        Ok(present.then_some(BrowserRow { index: offset }))
    }

    async fn extract_pair_identity(&self, row: &BrowserRow) -> Result<(String, String), UiError> {
        let names: Vec<String> = self
            .eval(self.script(&format!(
                "const row = rows()[{index}];\n\
                 if (!row) return [];\n\
                 return Array.from(row.querySelectorAll({names})).map(a => a.textContent.trim()).slice(0, 2);",
                index = row.index,
                names = js_str(&self.selectors().row_record_name),
            )))
            .await?;
        match <[String; 2]>::try_from(names) {
            Ok([left, right]) => Ok((left, right)),
            Err(found) => Err(UiError::NotReady(format!(
                "row {} shows {} record names",
                row.index,
                found.len()
            ))),
        }
    }

    async fn open_comparison(&self, row: &BrowserRow) -> Result<BrowserModal, UiError> {
        self.click(
            "review button",
            &format!(
                "const row = rows()[{index}];\n\
                 const button = row && row.querySelector({review});\n\
                 if (!button) return false;\n\
                 button.click();\n\
                 return true;",
                index = row.index,
                review = js_str(&self.selectors().review_button),
            ),
        )
        .await?;
        self.wait_until(self.modal_open_check()).await?;
        Ok(BrowserModal { row: row.index })
    }

    async fn extract_attributes(&self, _modal: &BrowserModal, side: Side) -> Result<RawRecord, UiError> {
        let s = self.selectors();
        let index = match side {
            Side::Left => 0,
            Side::Right => 1,
        };
        let found: Option<RawRecord> = self
            .eval::<serde_json::Value>(self.script(&format!(
                "const card = cards()[{index}];\n\
                 if (!card) return {{ found: false }};\n\
                 return {{ found: true, record: {{\n\
                   name: text(card, {name}),\n\
                   contact_count: text(card, {count}),\n\
                   domain: text(card, {domain}),\n\
                   email: text(card, {email}),\n\
                   phone: text(card, {phone}),\n\
                   contact_type: text(card, {kind}),\n\
                 }} }};",
                name = js_str(&s.record_name),
                count = js_str(&s.contact_count),
                domain = js_str(&s.domain),
                email = js_str(&s.email),
                phone = js_str(&s.phone),
                kind = js_str(&s.contact_type),
            )))
            .await
            .map(|value| value.get("record").cloned())?
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| UiError::Action(format!("unexpected record shape: {e}")))?;

        found.ok_or_else(|| UiError::NotReady(format!("{side} record card")))
    }

    async fn current_selection(&self, _modal: &BrowserModal) -> Result<Option<Side>, UiError> {
        let selected: String = self
            .eval(self.script(&format!(
                "const sel = {selected};\n\
                 const index = cards().findIndex(c => c.matches(sel) || c.querySelector(sel));\n\
                 return index === 0 ? 'left' : index === 1 ? 'right' : 'none';",
                selected = js_str(&self.selectors().selected_card),
            )))
            .await?;
        Ok(match selected.as_str() {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        })
    }

    async fn set_selection(&self, _modal: &BrowserModal, side: Side) -> Result<(), UiError> {
        let index = match side {
            Side::Left => 0,
            Side::Right => 1,
        };
        self.click(
            "record card",
            &format!(
                "const card = cards()[{index}];\n\
                 if (!card) return false;\n\
                 const target = card.querySelector('input[type=radio]') || card;\n\
                 target.click();\n\
                 return true;"
            ),
        )
        .await
    }

    async fn confirm_merge(&self, modal: &BrowserModal) -> Result<(), UiError> {
        self.click(
            "merge button",
            &format!(
                "const button = document.querySelector({merge});\n\
                 if (!button || button.disabled) return false;\n\
                 button.click();\n\
                 return true;",
                merge = js_str(&self.selectors().merge_button),
            ),
        )
        .await
        .map_err(|_| UiError::Action("merge button missing or disabled".into()))?;

        self.wait_until(format!("!({})", self.modal_open_check())).await?;
        debug!(row = modal.row, "merge dialog closed");
        Ok(())
    }

    async fn reject(&self, row: &BrowserRow) -> Result<(), UiError> {
        self.click(
            "reject button",
            &format!(
                "const row = rows()[{index}];\n\
                 const button = (row && row.querySelector({reject})) || document.querySelector({reject});\n\
                 if (!button) return false;\n\
                 button.click();\n\
                 return true;",
                index = row.index,
                reject = js_str(&self.selectors().reject_button),
            ),
        )
        .await
    }

    async fn cancel(&self, _modal: &BrowserModal) -> Result<(), UiError> {
        let open: bool = self.eval(self.modal_open_check()).await?;
        if !open {
            return Ok(());
        }
        self.click(
            "cancel button",
            &format!(
                "const button = document.querySelector({cancel});\n\
                 if (!button) return false;\n\
                 button.click();\n\
                 return true;",
                cancel = js_str(&self.selectors().cancel_button),
            ),
        )
        .await?;
        self.wait_until(format!("!({})", self.modal_open_check())).await
    }

    async fn refresh_queue(&self) -> Result<(), UiError> {
        self.page
            .goto(self.config.url.as_str())
            .await
            .map_err(|e| UiError::QueueUnavailable(format!("failed to reload queue: {e}")))?;
        self.wait_until("document.readyState === 'complete'".to_string())
            .await
    }
}

/// A JavaScript string literal for `s`.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_str_escapes_quotes() {
        assert_eq!(js_str("button[aria-label='Review']"), "\"button[aria-label='Review']\"");
        assert_eq!(js_str("a\"b"), "\"a\\\"b\"");
    }
}
