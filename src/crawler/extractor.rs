//! Streaming HTML link and text extraction
//!
//! Pages are fed through a `lol_html` rewriter in fixed-size chunks, so no DOM
//! is ever built and links are handed out while the rest of the page is still
//! being read. Visible text is accumulated alongside: `<br>` becomes a
//! newline and text directly after a `<script>` or `<style>` start tag is
//! dropped.

use crate::url::{resolve_link, SiteLink};
use lol_html::{doc_text, element, HtmlRewriter, Settings};
use std::cell::{Cell, RefCell};
use std::io::Read;

/// Bytes read from the source per rewriter write
const READ_CHUNK: usize = 8 * 1024;

/// What one scan of a page produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Visible text, one trailing space after each text run
    pub text: String,
    /// Number of links handed to the link callback
    pub links_found: usize,
    /// True when the scan stopped early on malformed input or a read error
    pub truncated: bool,
}

/// Scans an HTML stream, calling `on_link` for every anchor `href`
///
/// Each link is resolved against `site.host` before it is handed out.
/// `on_link` returns `false` to stop the scan (for example when its receiver
/// has gone away); the text gathered up to that point is still returned.
pub fn extract<R, F>(mut reader: R, site: &SiteLink, on_link: F) -> Extraction
where
    R: Read,
    F: FnMut(String) -> bool,
{
    let last_tag = RefCell::new(String::new());
    let text = RefCell::new(String::new());
    let pending = RefCell::new(String::new());
    let links_found = Cell::new(0usize);
    let stopped = Cell::new(false);
    let on_link = RefCell::new(on_link);

    let truncated = {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![element!("*", |el| {
                    let tag = el.tag_name();

                    if tag.eq_ignore_ascii_case("br") {
                        text.borrow_mut().push('\n');
                    } else if tag.eq_ignore_ascii_case("a") && !stopped.get() {
                        if let Some(href) = el.get_attribute("href") {
                            let href = decode_entities(href.trim());
                            if !href.is_empty() {
                                let link = resolve_link(&site.host, &href);
                                links_found.set(links_found.get() + 1);
                                if !(on_link.borrow_mut())(link) {
                                    stopped.set(true);
                                }
                            }
                        }
                    }

                    *last_tag.borrow_mut() = tag;
                    Ok(())
                })],
                document_content_handlers: vec![doc_text!(|chunk| {
                    pending.borrow_mut().push_str(chunk.as_str());
                    if !chunk.last_in_text_node() {
                        return Ok(());
                    }

                    let run = std::mem::take(&mut *pending.borrow_mut());
                    if is_hidden_text_tag(&last_tag.borrow()) {
                        return Ok(());
                    }

                    let decoded = decode_entities(&run);
                    let trimmed = decoded.trim();
                    if !trimmed.is_empty() {
                        let mut text = text.borrow_mut();
                        text.push_str(trimmed);
                        text.push(' ');
                    }
                    Ok(())
                })],
                ..Settings::default()
            },
            |_: &[u8]| {},
        );

        let mut buf = vec![0u8; READ_CHUNK];
        let mut truncated = false;

        loop {
            if stopped.get() {
                break;
            }

            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Read error while extracting {}: {}", site, e);
                    truncated = true;
                    break;
                }
            };

            if let Err(e) = rewriter.write(&buf[..read]) {
                tracing::warn!("HTML tokenization stopped for {}: {}", site, e);
                truncated = true;
                break;
            }
        }

        if !truncated && !stopped.get() {
            if let Err(e) = rewriter.end() {
                tracing::warn!("HTML tokenization stopped for {}: {}", site, e);
                truncated = true;
            }
        }

        truncated
    };

    Extraction {
        text: text.into_inner(),
        links_found: links_found.get(),
        truncated,
    }
}

/// Convenience wrapper collecting every link of an in-memory page
pub fn extract_links(html: &[u8], site: &SiteLink) -> (Vec<String>, Extraction) {
    let mut links = Vec::new();
    let extraction = extract(html, site, |link| {
        links.push(link);
        true
    });
    (links, extraction)
}

fn is_hidden_text_tag(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("script") || tag.eq_ignore_ascii_case("style")
}

/// Decodes every named and numeric character reference in `raw`
///
/// Unknown references are left as written.
pub fn decode_entities(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}
