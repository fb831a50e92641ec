//! Static sites.
//!
//! # Data Flow
//! ```text
//! request path under the site prefix
//!     → reject `..` segments (404)
//!     → file?        → stream it, MIME type by extension
//!     → directory?   → no trailing `/` → 302 to path + `/`
//!                    → default document, else listing, else 403
//!     → missing      → 404 (404 document only for HTML clients)
//! ```

pub mod fs;

use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use http::header::ACCEPT;
use http::{Method, StatusCode};

use crate::config::SiteConfig;
use crate::http::context::RequestContext;
use crate::routing::Binding;

pub use fs::{DirEntry, LocalFileSystem, MemoryFileSystem, ReadOnlyFileSystem};

pub const LISTING_NOT_ALLOWED: &str = "Directory listing not allowed";

/// A directory tree served under a router prefix.
pub struct SiteBinding {
    prefix: String,
    fs: Arc<dyn ReadOnlyFileSystem>,
    document_root: String,
    default_document: String,
    not_found_document: String,
    directory_listing: bool,
}

impl SiteBinding {
    pub fn new(fs: Arc<dyn ReadOnlyFileSystem>, document_root: impl Into<String>) -> Self {
        let defaults = SiteConfig::default();
        Self {
            prefix: String::new(),
            fs,
            document_root: document_root.into(),
            default_document: defaults.default_document,
            not_found_document: defaults.not_found_document,
            directory_listing: defaults.directory_listing,
        }
    }

    /// A site on the local disk.
    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(Arc::new(LocalFileSystem), config.document_root.clone())
            .at(config.path_prefix.clone())
            .default_document(config.default_document.clone())
            .not_found_document(config.not_found_document.clone())
            .directory_listing(config.directory_listing)
    }

    pub fn at(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_owned();
        self
    }

    pub fn default_document(mut self, name: impl Into<String>) -> Self {
        self.default_document = name.into();
        self
    }

    pub fn not_found_document(mut self, name: impl Into<String>) -> Self {
        self.not_found_document = name.into();
        self
    }

    pub fn directory_listing(mut self, allowed: bool) -> Self {
        self.directory_listing = allowed;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn serve(&self, ctx: &mut RequestContext, local: &str) {
        let (path, query) = match local.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (local, None),
        };
        let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));
        let segments: Vec<&str> = decoded
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();

        if segments.iter().any(|segment| *segment == ".." || segment.contains('\\')) {
            tracing::debug!(path = %path, "Rejected path traversal");
            self.not_found(ctx).await;
            return;
        }

        let relative = segments.join("/");
        let target = self.fs.normalize(&self.document_root, &relative);

        if self.fs.file_exists(&target).await {
            self.send_file(ctx, &target, StatusCode::OK).await;
            return;
        }
        if !self.fs.directory_exists(&target).await {
            self.not_found(ctx).await;
            return;
        }

        if !path.ends_with('/') {
            let mut location = format!("{}/", ctx.uri().path());
            if let Some(query) = query {
                location.push('?');
                location.push_str(query);
            }
            ctx.response_mut().redirect(&location);
            return;
        }

        let document = self.fs.normalize(&target, &self.default_document);
        if self.fs.file_exists(&document).await {
            self.send_file(ctx, &document, StatusCode::OK).await;
        } else if self.directory_listing {
            self.send_listing(ctx, &target, &relative).await;
        } else {
            ctx.response_mut().deny(StatusCode::FORBIDDEN, LISTING_NOT_ALLOWED);
        }
    }

    async fn send_file(&self, ctx: &mut RequestContext, path: &str, status: StatusCode) {
        match self.fs.open_read_stream(path).await {
            Ok(stream) => {
                let mime = mime_guess::from_path(path).first_or_octet_stream();
                let response = ctx.response_mut();
                response.set_status(status);
                response.send_stream(stream, mime.as_ref());
            }
            Err(error) => {
                tracing::warn!(path = %path, error = %error, "Failed to open document");
                ctx.response_mut()
                    .deny(StatusCode::INTERNAL_SERVER_ERROR, "Document unavailable");
            }
        }
    }

    async fn send_listing(&self, ctx: &mut RequestContext, dir: &str, relative: &str) {
        let entries = match self.fs.list_directory(dir).await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(path = %dir, error = %error, "Failed to list directory");
                ctx.response_mut()
                    .deny(StatusCode::INTERNAL_SERVER_ERROR, "Directory unavailable");
                return;
            }
        };

        let title = escape_html(&format!("/{relative}"));
        let mut html = format!("<!DOCTYPE html>\n<html><head><title>Index of {title}</title></head><body>\n<h1>Index of {title}</h1>\n<ul>\n");
        if !relative.is_empty() {
            html.push_str("<li><a href=\"../\">../</a></li>\n");
        }
        for entry in entries {
            let suffix = if entry.is_dir { "/" } else { "" };
            let _ = writeln!(
                html,
                "<li><a href=\"{}{suffix}\">{}{suffix}</a></li>",
                urlencoding::encode(&entry.name),
                escape_html(&entry.name),
            );
        }
        html.push_str("</ul>\n</body></html>\n");
        ctx.response_mut().send_html(html);
    }

    async fn not_found(&self, ctx: &mut RequestContext) {
        let wants_html = ctx
            .header(ACCEPT)
            .is_some_and(|accept| accept.contains("html"));
        if wants_html {
            let document = self.fs.normalize(&self.document_root, &self.not_found_document);
            if self.fs.file_exists(&document).await {
                self.send_file(ctx, &document, StatusCode::NOT_FOUND).await;
                return;
            }
        }
        let response = ctx.response_mut();
        response.set_status(StatusCode::NOT_FOUND);
        response.close();
    }
}

impl Binding for SiteBinding {
    fn process<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if !matches!(*ctx.method(), Method::GET | Method::HEAD) {
                return false;
            }
            let Some(local) = ctx.resolve_local_prefix(&self.prefix) else {
                return false;
            };
            ctx.claim();
            self.serve(ctx, &local).await;
            tracing::debug!(
                site = %self.prefix,
                path = %local,
                status = ctx.response().status().as_u16(),
                "Site request served"
            );
            true
        })
    }
}

impl std::fmt::Debug for SiteBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteBinding")
            .field("prefix", &self.prefix)
            .field("document_root", &self.document_root)
            .field("default_document", &self.default_document)
            .field("directory_listing", &self.directory_listing)
            .finish_non_exhaustive()
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
