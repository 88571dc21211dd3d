use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::{debug, error, info};
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::config::ConfigStore;
use crate::errors::Error;
use crate::metadataservice::routes;

const SERVER_ERROR_BODY: &str = "Internal Server Error\n";

/// Address of the requesting client as used for identity derivation.
/// IPv4-mapped IPv6 peers are reported in dotted-quad form, an unknown peer as the empty string.
pub fn client_address(remote: Option<SocketAddr>) -> String {
    match remote.map(|addr| addr.ip()) {
        Some(IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
            Some(ip4) => ip4.to_string(),
            None => ip.to_string(),
        },
        Some(IpAddr::V4(ip)) => ip.to_string(),
        None => String::new(),
    }
}

fn with_store(
    store: Arc<ConfigStore>,
) -> impl Filter<Extract = (Arc<ConfigStore>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

async fn handle(
    path: FullPath,
    remote: Option<SocketAddr>,
    store: Arc<ConfigStore>,
) -> Result<Response, Rejection> {
    let address = client_address(remote);
    let config = store.snapshot();
    match routes::dispatch(&config, path.as_str(), &address) {
        None => Err(warp::reject::not_found()),
        Some(Ok(body)) => {
            debug!("served {} to {:?}", path.as_str(), address);
            Ok(warp::reply::with_status(body, StatusCode::OK).into_response())
        }
        Some(Err(e)) => {
            error!("failed to serve {} to {:?}: {}", path.as_str(), address, e);
            Ok(
                warp::reply::with_status(SERVER_ERROR_BODY, StatusCode::INTERNAL_SERVER_ERROR)
                    .into_response(),
            )
        }
    }
}

/// All metadata routes, answering GET and HEAD from the store's current snapshot
pub fn metadata_filter(
    store: Arc<ConfigStore>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::get()
        .or(warp::head())
        .unify()
        .and(warp::path::full())
        .and(warp::addr::remote())
        .and(with_store(store))
        .and_then(handle)
}

pub async fn serve(
    store: Arc<ConfigStore>,
    listen: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Error> {
    let routes = metadata_filter(store).with(warp::trace::request());
    let (addr, server) = warp::serve(routes).try_bind_with_graceful_shutdown(listen, shutdown)?;
    info!("server: listening on {}", addr);
    server.await;
    info!("server: shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn store() -> Arc<ConfigStore> {
        let config: Configuration = [
            ("md-base", "/2009-04-04"),
            ("hostname-prefix", "vm"),
            ("password", "pw"),
            ("public-keys.default", "ssh-rsa AAA..."),
        ]
        .into_iter()
        .collect();
        Arc::new(ConfigStore::fixed(config))
    }

    fn peer() -> SocketAddr {
        "10.0.0.7:41234".parse().unwrap()
    }

    #[test]
    fn client_address_forms() {
        assert_eq!(client_address(Some(peer())), "10.0.0.7");
        let mapped = SocketAddr::new(Ipv4Addr::new(10, 0, 0, 7).to_ipv6_mapped().into(), 80);
        assert_eq!(client_address(Some(mapped)), "10.0.0.7");
        let v6 = SocketAddr::new(Ipv6Addr::LOCALHOST.into(), 80);
        assert_eq!(client_address(Some(v6)), "::1");
        assert_eq!(client_address(None), "");
    }

    #[tokio::test]
    async fn serves_metadata_for_peer() {
        let filter = metadata_filter(store());
        let cases = [
            ("/2009-04-04/meta-data/hostname", "vm-7\n"),
            ("/2009-04-04/meta-data/instance-id", "i-10.0.0.7\n"),
            ("/2009-04-04/meta-data/public-keys", "default\n"),
            ("/2009-04-04/meta-data/default/openssh-key", "ssh-rsa AAA...\n"),
            ("/latest/meta-data/public-keys//default/openssh-key", "ssh-rsa AAA...\n"),
        ];
        for (path, expected) in cases {
            let resp = warp::test::request()
                .path(path)
                .remote_addr(peer())
                .reply(&filter)
                .await;
            assert_eq!(resp.status(), StatusCode::OK, "{path}");
            assert_eq!(resp.body(), expected, "{path}");
        }
    }

    #[tokio::test]
    async fn responses_are_plain_text() {
        let resp = warp::test::request()
            .path("/2009-04-04/user-data")
            .remote_addr(peer())
            .reply(&metadata_filter(store()))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(resp.body().starts_with(b"#cloud-config\nhostname: vm-7\n"));
    }

    #[tokio::test]
    async fn unconfigured_default_key_is_served_as_sentinel() {
        let store = Arc::new(ConfigStore::load(None).unwrap());
        assert!(store.snapshot().default_key_unset());
        let resp = warp::test::request()
            .path("/2009-04-04/meta-data/public-keys//default/openssh-key")
            .remote_addr(peer())
            .reply(&metadata_filter(store))
            .await;
        assert_eq!(resp.body(), "__NOT_CONFIGURED__\n");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let resp = warp::test::request()
            .path("/2009-04-04/nothing-here")
            .remote_addr(peer())
            .reply(&metadata_filter(store()))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_is_served() {
        let resp = warp::test::request()
            .method("HEAD")
            .path("/2009-04-04/meta-data/hostname")
            .remote_addr(peer())
            .reply(&metadata_filter(store()))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        let resp = warp::test::request()
            .method("POST")
            .path("/2009-04-04/meta-data/hostname")
            .remote_addr(peer())
            .reply(&metadata_filter(store()))
            .await;
        assert_ne!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn resolver_error_is_a_generic_server_error() {
        let store = Arc::new(ConfigStore::fixed(
            [("md-base", "/2009-04-04")].into_iter().collect(),
        ));
        let resp = warp::test::request()
            .path("/2009-04-04/meta-data/default/openssh-key")
            .remote_addr(peer())
            .reply(&metadata_filter(store))
            .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body(), SERVER_ERROR_BODY);
    }

    #[tokio::test]
    async fn missing_peer_address_degrades() {
        let resp = warp::test::request()
            .path("/2009-04-04/meta-data/instance-id")
            .reply(&metadata_filter(store()))
            .await;
        assert_eq!(resp.body(), "i-\n");
    }
}
