//! Presentation collaborators.
//!
//! The dispatcher never formats HTML itself. It hands failures to a
//! [`Renderer`], the collected toolbar data to a [`ToolbarRenderer`] and
//! dumped values to an [`Inspector`]. Each trait comes with a plain
//! implementation so the crate works without any presentation layer of its
//! own: [`PlainRenderer`], [`PlainToolbar`] and [`DebugInspector`].

use core::fmt::{self, Write as _};
use std::{fs, path::PathBuf};

use crate::{
    bar::DebugBar,
    failure::{CapturedFailure, SourceLocation},
    host::Host,
};

/// Extra stylesheets and scripts included in the diagnostic screen and the
/// toolbar.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomAssets {
    /// Stylesheet files.
    pub css: Vec<PathBuf>,
    /// Script files.
    pub js: Vec<PathBuf>,
}

impl CustomAssets {
    /// Concatenated content of every readable stylesheet.
    pub fn css_content(&self) -> String {
        read_all(&self.css)
    }

    /// Concatenated content of every readable script.
    pub fn js_content(&self) -> String {
        read_all(&self.js)
    }
}

fn read_all(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turns failures into HTML pages.
pub trait Renderer: Send + Sync {
    /// The full diagnostic screen for a failure.
    fn render_diagnostic(&self, failure: &CapturedFailure, assets: &CustomAssets) -> String;

    /// The generic page shown to end users in production.
    fn render_failure_page(&self, logged: bool) -> String;
}

/// Renders the debug toolbar.
pub trait ToolbarRenderer: Send + Sync {
    /// The toolbar markup for the collected data.
    fn render(&self, bar: &DebugBar, assets: &CustomAssets) -> String;

    /// Markup that loads the toolbar asynchronously.
    fn render_loader(&self) -> String;

    /// Serves a toolbar asset through `host` if the current request asks for
    /// one.
    ///
    /// Returns `true` when the request was fully answered and the application
    /// should stop processing it.
    fn dispatch_assets(&self, host: &dyn Host) -> bool;
}

/// Bounds for dumping values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DumpOptions {
    /// Nesting depth past which structures are collapsed.
    pub max_depth: usize,
    /// Length past which lines are cut.
    pub max_length: usize,
    /// Whether the dump names the place it was called from.
    pub show_location: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_length: 150,
            show_location: false,
        }
    }
}

/// Pretty-prints values.
pub trait Inspector: Send + Sync {
    /// Plain text form.
    fn to_text(
        &self,
        value: &dyn fmt::Debug,
        options: &DumpOptions,
        location: &SourceLocation,
    ) -> String;

    /// HTML form.
    fn to_html(
        &self,
        value: &dyn fmt::Debug,
        options: &DumpOptions,
        location: &SourceLocation,
    ) -> String;
}

/// An [`Inspector`] built on the alternate `Debug` format.
///
/// Every nesting level of `{:#?}` output is indented by four spaces. Lines
/// deeper than `max_depth` are folded into a single `…`, and lines longer
/// than `max_length` characters are cut.
///
/// # Examples
///
/// ```
/// use faultline::{
///     failure::SourceLocation,
///     render::{DebugInspector, DumpOptions, Inspector},
/// };
///
/// let options = DumpOptions {
///     max_depth: 1,
///     ..DumpOptions::default()
/// };
/// let text = DebugInspector.to_text(&vec![vec![1, 2]], &options, &SourceLocation::caller());
/// assert_eq!(text, "[\n    [\n        …\n    ],\n]\n");
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct DebugInspector;

impl DebugInspector {
    fn bounded(value: &dyn fmt::Debug, options: &DumpOptions) -> String {
        let full = format!("{value:#?}");
        let mut out = String::with_capacity(full.len().min(4096));
        let mut folded = false;

        for line in full.lines() {
            let depth = (line.len() - line.trim_start_matches(' ').len()) / 4;
            if depth > options.max_depth {
                if !folded {
                    out.push_str(&"    ".repeat(depth));
                    out.push_str("…\n");
                    folded = true;
                }
                continue;
            }
            folded = false;

            match line.char_indices().nth(options.max_length) {
                Some((cut, _)) => {
                    out.push_str(&line[..cut]);
                    out.push_str(" …");
                }
                None => out.push_str(line),
            }
            out.push('\n');
        }
        out
    }
}

impl Inspector for DebugInspector {
    fn to_text(
        &self,
        value: &dyn fmt::Debug,
        options: &DumpOptions,
        location: &SourceLocation,
    ) -> String {
        let mut text = Self::bounded(value, options);
        if options.show_location {
            let _ = writeln!(text, "in {location}");
        }
        text
    }

    fn to_html(
        &self,
        value: &dyn fmt::Debug,
        options: &DumpOptions,
        location: &SourceLocation,
    ) -> String {
        let mut html = format!(
            "<pre class=\"faultline-dump\">{}",
            escape_html(&Self::bounded(value, options))
        );
        if options.show_location {
            let _ = write!(
                html,
                "<small>in {}</small>",
                escape_html(&location.to_string())
            );
        }
        html.push_str("</pre>\n");
        html
    }
}

/// Minimal HTML pages with no scripting.
#[derive(Copy, Clone, Debug, Default)]
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render_diagnostic(&self, failure: &CapturedFailure, assets: &CustomAssets) -> String {
        let mut page = String::new();
        let _ = write!(
            page,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n",
            escape_html(&failure.to_string())
        );
        let css = assets.css_content();
        if !css.is_empty() {
            let _ = write!(page, "<style>\n{css}\n</style>\n");
        }
        page.push_str("</head>\n<body id=\"faultline-screen\">\n");

        for (depth, failure) in failure.chain().enumerate() {
            if depth > 0 {
                page.push_str("<h2>Caused by</h2>\n");
            }
            let _ = write!(
                page,
                "<h1>{}</h1>\n<p>{}</p>\n",
                escape_html(failure.class()),
                escape_html(failure.message())
            );
            if let Some(location) = failure.location() {
                let _ = write!(
                    page,
                    "<p class=\"location\">{}</p>\n",
                    escape_html(&location.to_string())
                );
            }
            if failure.is_skippable() {
                page.push_str("<p class=\"skip\"><a href=\"?_faultline_skip_error\">skip error</a></p>\n");
            }
            if !failure.frames().is_empty() {
                page.push_str("<ol class=\"stack\">\n");
                for frame in failure.frames() {
                    let _ = writeln!(page, "<li>{}</li>", escape_html(&frame.to_string()));
                }
                page.push_str("</ol>\n");
            }
        }

        if let Some(context) = failure.context().filter(|context| !context.is_empty()) {
            page.push_str("<h2>Context</h2>\n<table>\n");
            for (key, value) in context.iter() {
                let _ = writeln!(
                    page,
                    "<tr><th>{}</th><td>{}</td></tr>",
                    escape_html(key),
                    escape_html(value)
                );
            }
            page.push_str("</table>\n");
        }

        let js = assets.js_content();
        if !js.is_empty() {
            let _ = write!(page, "<script>\n{js}\n</script>\n");
        }
        page.push_str("</body>\n</html>\n");
        page
    }

    fn render_failure_page(&self, logged: bool) -> String {
        let mut page = String::from(
            "<!DOCTYPE html>\n<meta charset=\"utf-8\">\n<meta name=\"robots\" content=\"noindex\">\n\
             <title>Server Error</title>\n\
             <h1>Server Error</h1>\n\
             <p>We're sorry! The server encountered an internal error and was unable to complete \
             your request. Please try again later.</p>\n<p><small>error 500</small></p>\n",
        );
        if !logged {
            page.push_str("<p><small>The error could not be logged.</small></p>\n");
        }
        page
    }
}

/// Query parameter naming a requested toolbar asset.
pub const ASSET_PARAMETER: &str = "_faultline_bar";

const TOOLBAR_SCRIPT: &str = "document.querySelectorAll('#faultline-bar .panel').forEach(\
function (panel) { panel.hidden = true; });";

/// A static, script-free toolbar.
///
/// The toolbar shows the time since the debugger was enabled, the errors
/// panel (each distinct warning with its count) and the dumps panel.
#[derive(Clone, Debug, Default)]
pub struct PlainToolbar {
    asset_request: Option<String>,
}

impl PlainToolbar {
    /// A toolbar that never serves assets.
    pub fn new() -> Self {
        Self::default()
    }

    /// A toolbar answering the asset named in `query` (a URL query string),
    /// if it names one.
    pub fn for_query(query: &str) -> Self {
        let asset_request = query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == ASSET_PARAMETER).then(|| value.to_owned())
        });
        Self { asset_request }
    }

    /// A toolbar answering the asset named in the `QUERY_STRING` variable.
    pub fn from_env() -> Self {
        std::env::var("QUERY_STRING")
            .map(|query| Self::for_query(&query))
            .unwrap_or_default()
    }
}

impl ToolbarRenderer for PlainToolbar {
    fn render(&self, bar: &DebugBar, assets: &CustomAssets) -> String {
        let mut html = String::from("<div id=\"faultline-bar\">\n");
        let css = assets.css_content();
        if !css.is_empty() {
            let _ = write!(html, "<style>\n{css}\n</style>\n");
        }

        if let Some(elapsed) = bar.elapsed() {
            let _ = writeln!(
                html,
                "<section class=\"panel\" id=\"faultline-info\"><h2>Info</h2>\
                 <p>Execution time: {:.1} ms</p></section>",
                elapsed.as_secs_f64() * 1000.0
            );
        }

        let _ = writeln!(
            html,
            "<section class=\"panel\" id=\"faultline-errors\"><h2>Errors ({})</h2><ul>",
            bar.error_total()
        );
        let mut errors: Vec<_> = bar.errors().iter().collect();
        errors.sort_by(|(a, _), (b, _)| (&a.file, a.line).cmp(&(&b.file, b.line)));
        for (key, count) in errors {
            let _ = writeln!(
                html,
                "<li>{} <small>{}:{}</small> &times;{count}</li>",
                escape_html(&key.message),
                escape_html(&key.file),
                key.line
            );
        }
        html.push_str("</ul></section>\n");

        let _ = writeln!(
            html,
            "<section class=\"panel\" id=\"faultline-dumps\"><h2>Dumps ({})</h2>",
            bar.dumps().len()
        );
        for dump in bar.dumps() {
            if let Some(title) = &dump.title {
                let _ = writeln!(html, "<h3>{}</h3>", escape_html(title));
            }
            html.push_str(&dump.html);
        }
        html.push_str("</section>\n");

        let js = assets.js_content();
        if !js.is_empty() {
            let _ = write!(html, "<script>\n{js}\n</script>\n");
        }
        html.push_str("</div>\n");
        html
    }

    fn render_loader(&self) -> String {
        format!("<script src=\"?{ASSET_PARAMETER}=js\" async></script>\n")
    }

    fn dispatch_assets(&self, host: &dyn Host) -> bool {
        match self.asset_request.as_deref() {
            Some("js") => {
                host.set_header("Content-Type", "application/javascript; charset=UTF-8");
                host.write_output(TOOLBAR_SCRIPT);
                true
            }
            _ => false,
        }
    }
}

/// Escapes the five HTML special characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}
