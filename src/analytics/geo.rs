//! Geo enrichment for click events.
//!
//! Resolution ladder: geo headers injected by the trusted edge proxy win,
//! the local MaxMind database fills whatever they left blank, and anything
//! still missing becomes `unknown`.

use std::net::IpAddr;
use std::sync::Arc;

use actix_web::http::header::HeaderMap;
use async_trait::async_trait;
use maxminddb::Reader;
use tracing::trace;

pub const DEFAULT_GEO: &str = "unknown";

const COUNTRY_HEADER: &str = "x-vercel-ip-country";
const CITY_HEADER: &str = "x-vercel-ip-city";
const CONTINENT_HEADER: &str = "x-vercel-ip-continent";

/// Final dimension values, defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country: String,
    pub city: String,
    pub continent: String,
}

impl Default for GeoInfo {
    fn default() -> Self {
        Self {
            country: DEFAULT_GEO.to_string(),
            city: DEFAULT_GEO.to_string(),
            continent: DEFAULT_GEO.to_string(),
        }
    }
}

/// Raw provider hit; unset fields fall through the ladder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoHit {
    pub country: Option<String>,
    pub city: Option<String>,
    pub continent: Option<String>,
}

#[async_trait]
pub trait GeoIpLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Option<GeoHit>;
    fn name(&self) -> &'static str;
}

pub struct MaxMindProvider {
    reader: Arc<Reader<Vec<u8>>>,
}

impl MaxMindProvider {
    pub fn new(path: &str) -> Result<Self, maxminddb::MaxMindDbError> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }
}

#[async_trait]
impl GeoIpLookup for MaxMindProvider {
    async fn lookup(&self, ip: &str) -> Option<GeoHit> {
        let ip_addr: IpAddr = ip.parse().ok()?;

        let result = self.reader.lookup(ip_addr).ok()?;
        let city: maxminddb::geoip2::City = result.decode().ok()??;

        let hit = GeoHit {
            country: city.country.iso_code.map(String::from),
            city: city.city.names.english.map(String::from),
            continent: city.continent.code.map(String::from),
        };
        trace!("MaxMind lookup for {}: {:?}", ip, hit);
        Some(hit)
    }

    fn name(&self) -> &'static str {
        "MaxMind"
    }
}

pub struct GeoResolver {
    provider: Option<Arc<dyn GeoIpLookup>>,
}

impl GeoResolver {
    pub fn new(provider: Option<Arc<dyn GeoIpLookup>>) -> Self {
        Self { provider }
    }

    /// Resolves geo dimensions for a request.
    pub async fn resolve(&self, headers: &HeaderMap, ip: Option<&str>) -> GeoInfo {
        let mut hit = GeoHit {
            country: header_value(headers, COUNTRY_HEADER),
            // The proxy percent-encodes city names.
            city: header_value(headers, CITY_HEADER)
                .map(|raw| urlencoding::decode(&raw).map_or(raw.clone(), |s| s.into_owned())),
            continent: header_value(headers, CONTINENT_HEADER),
        };

        let incomplete = hit.country.is_none() || hit.city.is_none() || hit.continent.is_none();
        if incomplete {
            if let (Some(provider), Some(ip)) = (self.provider.as_ref(), ip) {
                if let Some(looked_up) = provider.lookup(ip).await {
                    hit.country = hit.country.or(looked_up.country);
                    hit.city = hit.city.or(looked_up.city);
                    hit.continent = hit.continent.or(looked_up.continent);
                }
            }
        }

        GeoInfo {
            country: hit.country.unwrap_or_else(|| DEFAULT_GEO.to_string()),
            city: hit.city.unwrap_or_else(|| DEFAULT_GEO.to_string()),
            continent: hit.continent.unwrap_or_else(|| DEFAULT_GEO.to_string()),
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    struct StubProvider(GeoHit);

    #[async_trait]
    impl GeoIpLookup for StubProvider {
        async fn lookup(&self, _ip: &str) -> Option<GeoHit> {
            Some(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "Stub"
        }
    }

    #[tokio::test]
    async fn test_proxy_headers_win() {
        let req = TestRequest::default()
            .insert_header((COUNTRY_HEADER, "BR"))
            .insert_header((CITY_HEADER, "S%C3%A3o%20Paulo"))
            .insert_header((CONTINENT_HEADER, "SA"))
            .to_http_request();

        let resolver = GeoResolver::new(Some(Arc::new(StubProvider(GeoHit {
            country: Some("US".to_string()),
            city: Some("Portland".to_string()),
            continent: Some("NA".to_string()),
        }))));

        let geo = resolver
            .resolve(req.headers(), Some("203.0.113.7"))
            .await;
        assert_eq!(geo.country, "BR");
        assert_eq!(geo.city, "São Paulo");
        assert_eq!(geo.continent, "SA");
    }

    #[tokio::test]
    async fn test_provider_fills_header_gaps() {
        let req = TestRequest::default()
            .insert_header((COUNTRY_HEADER, "US"))
            .to_http_request();

        let resolver = GeoResolver::new(Some(Arc::new(StubProvider(GeoHit {
            country: Some("DE".to_string()),
            city: Some("Portland".to_string()),
            continent: Some("NA".to_string()),
        }))));

        let geo = resolver
            .resolve(req.headers(), Some("203.0.113.7"))
            .await;
        assert_eq!(geo.country, "US", "header beats provider");
        assert_eq!(geo.city, "Portland");
        assert_eq!(geo.continent, "NA");
    }

    #[tokio::test]
    async fn test_defaults_when_nothing_resolves() {
        let req = TestRequest::default().to_http_request();
        let resolver = GeoResolver::new(None);

        let geo = resolver.resolve(req.headers(), None).await;
        assert_eq!(geo, GeoInfo::default());
        assert_eq!(geo.country, "unknown");
    }

    #[tokio::test]
    async fn test_provider_miss_leaves_defaults() {
        struct MissProvider;
        #[async_trait]
        impl GeoIpLookup for MissProvider {
            async fn lookup(&self, _ip: &str) -> Option<GeoHit> {
                None
            }
            fn name(&self) -> &'static str {
                "Miss"
            }
        }

        let req = TestRequest::default().to_http_request();
        let resolver = GeoResolver::new(Some(Arc::new(MissProvider)));

        let geo = resolver.resolve(req.headers(), Some("10.0.0.1")).await;
        assert_eq!(geo, GeoInfo::default());
    }
}
