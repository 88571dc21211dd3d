//! Path-to-handler table of the metadata API.
//!
//! Paths are matched segment by segment, so empty segments (`//`) are significant.
//! `<key>` matches one non-empty segment and is percent-decoded. Routes are tried in table
//! order, with the static routes listed before the parameterised ones.

use std::borrow::Cow;

use crate::config::{Configuration, HOSTNAME_PREFIX, MD_BASE};
use crate::errors::Error;
use crate::metadataservice::identity::{resolve_hostname, resolve_instance_id};
use crate::metadataservice::keys::{
    DEFAULT_KEY_NAME, list_key_names, resolve_key_directory, resolve_key_material,
};
use crate::metadataservice::userdata;

pub const DEFAULT_MD_BASE: &str = "/2009-04-04";
const DEFAULT_HOSTNAME_PREFIX: &str = "vm";
const LATEST: &str = "/latest";
const KEY_PARAM: &str = "<key>";

/// Output of a handler before it is turned into a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Lines(Vec<String>),
    Text(String),
}

impl Content {
    /// Lines are joined with `\n`, a single text gets exactly one trailing `\n`
    pub fn make_content(self) -> String {
        match self {
            Content::Lines(lines) => lines.join("\n"),
            Content::Text(text) => format!("{text}\n"),
        }
    }
}

type Handler = fn(&Configuration, &str, Option<&str>) -> Result<Content, Error>;

#[derive(Debug, Clone, Copy)]
enum Root {
    /// The configured `md-base`
    Base,
    Latest,
}

struct Route {
    root: Root,
    tail: &'static str,
    handler: Handler,
}

const ROUTES: &[Route] = &[
    Route { root: Root::Base, tail: "/meta-data/", handler: metadata_index },
    Route { root: Root::Base, tail: "/user-data", handler: user_data },
    Route { root: Root::Base, tail: "/meta-data/hostname", handler: hostname },
    Route { root: Root::Base, tail: "/meta-data/instance-id", handler: instance_id },
    Route { root: Root::Base, tail: "/meta-data/public-keys", handler: public_keys },
    Route { root: Root::Base, tail: "/meta-data/public-keys/", handler: public_keys },
    Route { root: Root::Base, tail: "/meta-data/<key>", handler: public_key_dir },
    Route { root: Root::Base, tail: "/meta-data/<key>/", handler: public_key_dir },
    Route { root: Root::Base, tail: "/meta-data/<key>/openssh-key", handler: public_key_file },
    Route { root: Root::Base, tail: "/meta-data//<key>/openssh-key", handler: public_key_file },
    Route {
        root: Root::Base,
        tail: "/meta-data/public-keys//<key>/openssh-key",
        handler: public_key_file,
    },
    Route {
        root: Root::Latest,
        tail: "/meta-data/public-keys//<key>/openssh-key",
        handler: public_key_file,
    },
];

fn metadata_index(_: &Configuration, _: &str, _: Option<&str>) -> Result<Content, Error> {
    Ok(Content::Lines(
        ["instance-id", "hostname", "public-keys", ""]
            .into_iter()
            .map(String::from)
            .collect(),
    ))
}

fn user_data(config: &Configuration, address: &str, _: Option<&str>) -> Result<Content, Error> {
    let hostname = resolve_hostname(address, hostname_prefix(config));
    userdata::render(config, &hostname).map(Content::Text)
}

fn hostname(config: &Configuration, address: &str, _: Option<&str>) -> Result<Content, Error> {
    Ok(Content::Text(resolve_hostname(
        address,
        hostname_prefix(config),
    )))
}

fn instance_id(_: &Configuration, address: &str, _: Option<&str>) -> Result<Content, Error> {
    Ok(Content::Text(resolve_instance_id(address)))
}

fn public_keys(config: &Configuration, _: &str, _: Option<&str>) -> Result<Content, Error> {
    Ok(Content::Lines(list_key_names(config)))
}

fn public_key_dir(config: &Configuration, _: &str, key: Option<&str>) -> Result<Content, Error> {
    let key = key.unwrap_or(DEFAULT_KEY_NAME);
    Ok(Content::Text(resolve_key_directory(key, config)))
}

fn public_key_file(config: &Configuration, _: &str, key: Option<&str>) -> Result<Content, Error> {
    let key = key.unwrap_or(DEFAULT_KEY_NAME);
    resolve_key_material(key, config).map(Content::Text)
}

fn hostname_prefix(config: &Configuration) -> &str {
    config.get_or(HOSTNAME_PREFIX, DEFAULT_HOSTNAME_PREFIX)
}

/// Match `path` against `pattern`, returning the `<key>` segment if the pattern has one
fn match_tail<'p>(pattern: &str, path: &'p str) -> Option<Option<&'p str>> {
    let mut pattern_segments = pattern.split('/');
    let mut path_segments = path.split('/');
    let mut key = None;
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return Some(key),
            (Some(KEY_PARAM), Some(segment)) if !segment.is_empty() => key = Some(segment),
            (Some(expected), Some(segment)) if expected != KEY_PARAM && expected == segment => {}
            _ => return None,
        }
    }
}

/// Dispatch a request path to its handler and format the result as a response body.
/// Returns `None` if no route matches.
pub fn dispatch(config: &Configuration, path: &str, address: &str) -> Option<Result<String, Error>> {
    let base = config.get_or(MD_BASE, DEFAULT_MD_BASE).trim_end_matches('/');
    ROUTES.iter().find_map(|route| {
        let root = match route.root {
            Root::Base => base,
            Root::Latest => LATEST,
        };
        let key = match_tail(route.tail, path.strip_prefix(root)?)?
            .map(|key| urlencoding::decode(key).unwrap_or(Cow::Borrowed(key)));
        Some((route.handler)(config, address, key.as_deref()).map(Content::make_content))
    })
}
