//! Host/path classifier.
//!
//! Pure mapping from `(hostname, pathname)` to a routing intent. No I/O and
//! no side effects; the two moka caches are idempotent memoization, so
//! concurrent fills of the same key are harmless.

use moka::sync::Cache;
use strum::AsRefStr;

/// What the edge layer should do with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RouteIntent {
    /// Framework/static file, passed through before any other work
    StaticAsset,
    /// bio.<root>: public bio pages
    BioSubdomain,
    /// assets.<root>: uploaded media
    AssetSubdomain,
    /// app.<root>: the authenticated dashboard
    AppSubdomain,
    /// admin.<root>: internal operations panel
    AdminSubdomain,
    /// The apex itself: `/` goes to the app, other paths are short codes
    RootDomainRedirect,
    /// A tenant-owned domain serving that tenant's short links
    CustomDomain,
    /// Unrecognized first-party subdomain, rewritten to the fallback app
    UnknownRewrite,
}

impl RouteIntent {
    /// Rate limiting and session resolution only apply to hosts we
    /// recognize as our own. Tenant traffic on custom domains (and anything
    /// we cannot place) is never gated, both to avoid penalizing it and to
    /// bound limiter-state cardinality.
    pub fn is_first_party(&self) -> bool {
        matches!(
            self,
            RouteIntent::BioSubdomain
                | RouteIntent::AssetSubdomain
                | RouteIntent::AppSubdomain
                | RouteIntent::AdminSubdomain
                | RouteIntent::RootDomainRedirect
        )
    }

    /// Hosts on which a bare path segment is a short code to resolve.
    pub fn serves_short_links(&self) -> bool {
        matches!(
            self,
            RouteIntent::RootDomainRedirect | RouteIntent::CustomDomain
        )
    }
}

/// Extensions served by the CDN/framework layer, checked before everything
/// else on the hot path.
const STATIC_EXTENSIONS: &[&str] = &[
    ".js",
    ".css",
    ".map",
    ".ico",
    ".png",
    ".jpg",
    ".jpeg",
    ".gif",
    ".svg",
    ".webp",
    ".avif",
    ".woff",
    ".woff2",
    ".ttf",
    ".txt",
    ".xml",
    ".json",
    ".webmanifest",
];

const STATIC_PREFIXES: &[&str] = &[
    "/_next",
    "/static",
    "/assets",
    "/favicon.ico",
    "/robots.txt",
    "/sitemap",
];

/// Static-asset test on the raw pathname, independent of hostname.
pub fn is_static_asset(pathname: &str) -> bool {
    if STATIC_PREFIXES.iter().any(|p| pathname.starts_with(p)) {
        return true;
    }
    let lower = pathname.to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

pub struct Classifier {
    root_domain: String,
    bio_host: String,
    assets_host: String,
    app_host: String,
    admin_host: String,
    first_party_suffix: String,
    /// raw hostname -> normalized hostname
    host_cache: Cache<String, String>,
    /// pathname -> static-asset flag
    path_cache: Cache<String, bool>,
}

impl Classifier {
    pub fn new(root_domain: &str, cache_capacity: u64) -> Self {
        let root = root_domain.trim().trim_end_matches('.').to_ascii_lowercase();
        Self {
            bio_host: format!("bio.{}", root),
            assets_host: format!("assets.{}", root),
            app_host: format!("app.{}", root),
            admin_host: format!("admin.{}", root),
            first_party_suffix: format!(".{}", root),
            root_domain: root,
            host_cache: Cache::new(cache_capacity),
            path_cache: Cache::new(cache_capacity),
        }
    }

    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }

    pub fn classify(&self, hostname: &str, pathname: &str) -> RouteIntent {
        // Cheapest check first: static assets bypass everything, including
        // host normalization.
        let is_static = self
            .path_cache
            .get_with(pathname.to_string(), || is_static_asset(pathname));
        if is_static {
            return RouteIntent::StaticAsset;
        }

        self.intent_for_host(&self.canonical_host(hostname))
    }

    /// Normalized form of a hostname, memoized. Link resolution keys on the
    /// same canonical host the classifier matched, so `dev.localhost:3000`
    /// and `dev.slugy.co` hit the same rows.
    pub fn canonical_host(&self, hostname: &str) -> String {
        self.host_cache
            .get_with(hostname.to_string(), || self.normalize_host(hostname))
    }

    /// Lowercase, strip the port, and map `*.localhost` onto the configured
    /// root domain so local development routes like production.
    fn normalize_host(&self, hostname: &str) -> String {
        let host = hostname
            .split(':')
            .next()
            .unwrap_or(hostname)
            .trim_end_matches('.')
            .to_ascii_lowercase();

        if host == "localhost" {
            return self.root_domain.clone();
        }
        if let Some(sub) = host.strip_suffix(".localhost") {
            return format!("{}{}", sub, self.first_party_suffix);
        }
        host
    }

    fn intent_for_host(&self, host: &str) -> RouteIntent {
        if host == self.root_domain {
            RouteIntent::RootDomainRedirect
        } else if host == self.bio_host {
            RouteIntent::BioSubdomain
        } else if host == self.assets_host {
            RouteIntent::AssetSubdomain
        } else if host == self.app_host {
            RouteIntent::AppSubdomain
        } else if host == self.admin_host {
            RouteIntent::AdminSubdomain
        } else if host.ends_with(&self.first_party_suffix) {
            RouteIntent::UnknownRewrite
        } else {
            RouteIntent::CustomDomain
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new("slugy.co", 128)
    }

    // ============ static assets ============

    #[test]
    fn test_static_assets_win_regardless_of_host() {
        let c = classifier();
        let cases = [
            ("slugy.co", "/_next/static/chunks/main.js"),
            ("app.slugy.co", "/logo.png"),
            ("bio.slugy.co", "/styles.css"),
            ("tenant.example.com", "/favicon.ico"),
            ("whatever.invalid", "/robots.txt"),
            ("slugy.co", "/fonts/inter.woff2"),
            ("slugy.co", "/sitemap-0.xml"),
        ];
        for (host, path) in cases {
            assert_eq!(
                c.classify(host, path),
                RouteIntent::StaticAsset,
                "{} {}",
                host,
                path
            );
        }
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        assert!(is_static_asset("/banner.PNG"));
        assert!(is_static_asset("/app.JS"));
        assert!(!is_static_asset("/promo"));
    }

    // ============ first-party hosts ============

    #[test]
    fn test_first_party_subdomains() {
        let c = classifier();
        let cases = [
            ("bio.slugy.co", RouteIntent::BioSubdomain),
            ("assets.slugy.co", RouteIntent::AssetSubdomain),
            ("app.slugy.co", RouteIntent::AppSubdomain),
            ("admin.slugy.co", RouteIntent::AdminSubdomain),
            ("slugy.co", RouteIntent::RootDomainRedirect),
            ("beta.slugy.co", RouteIntent::UnknownRewrite),
            ("a.b.slugy.co", RouteIntent::UnknownRewrite),
        ];
        for (host, expected) in cases {
            assert_eq!(c.classify(host, "/promo"), expected, "{}", host);
        }
    }

    #[test]
    fn test_custom_domains() {
        let c = classifier();
        for host in ["links.acme.com", "go.example.org", "slugy.company"] {
            assert_eq!(
                c.classify(host, "/promo"),
                RouteIntent::CustomDomain,
                "{}",
                host
            );
        }
    }

    // ============ localhost normalization ============

    #[test]
    fn test_localhost_maps_to_root_domain() {
        let c = classifier();
        assert_eq!(
            c.classify("localhost", "/promo"),
            RouteIntent::RootDomainRedirect
        );
        assert_eq!(
            c.classify("localhost:3000", "/promo"),
            RouteIntent::RootDomainRedirect
        );
    }

    #[test]
    fn test_localhost_subdomains_map_like_production() {
        let c = classifier();
        assert_eq!(
            c.classify("app.localhost:3000", "/dashboard"),
            RouteIntent::AppSubdomain
        );
        assert_eq!(
            c.classify("bio.localhost:3000", "/someone"),
            RouteIntent::BioSubdomain
        );
        assert_eq!(
            c.classify("admin.localhost", "/ops"),
            RouteIntent::AdminSubdomain
        );
    }

    // ============ normalization quirks ============

    #[test]
    fn test_port_and_case_are_ignored() {
        let c = classifier();
        assert_eq!(
            c.classify("APP.SLUGY.CO:8443", "/x"),
            RouteIntent::AppSubdomain
        );
        assert_eq!(
            c.classify("slugy.co:443", "/x"),
            RouteIntent::RootDomainRedirect
        );
    }

    #[test]
    fn test_classification_is_deterministic_across_calls() {
        let c = classifier();
        for _ in 0..3 {
            assert_eq!(
                c.classify("go.example.org", "/promo"),
                RouteIntent::CustomDomain
            );
        }
    }

    #[test]
    fn test_first_party_predicate() {
        assert!(RouteIntent::AppSubdomain.is_first_party());
        assert!(RouteIntent::RootDomainRedirect.is_first_party());
        assert!(!RouteIntent::CustomDomain.is_first_party());
        assert!(!RouteIntent::UnknownRewrite.is_first_party());
        assert!(!RouteIntent::StaticAsset.is_first_party());
    }

    #[test]
    fn test_short_link_hosts() {
        assert!(RouteIntent::RootDomainRedirect.serves_short_links());
        assert!(RouteIntent::CustomDomain.serves_short_links());
        assert!(!RouteIntent::AppSubdomain.serves_short_links());
    }
}
