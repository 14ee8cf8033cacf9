// Copyright (c) Recovery Bench Developers.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type BenchProps = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchSpec {
    pub kind: String,
    pub id: Option<String>,
    pub props: BenchProps,
}

impl BenchSpec {
    pub fn new(kind: &str, id: Option<&str>, props: BenchProps) -> Self {
        Self {
            kind: kind.to_owned(),
            id: id.map(Into::into),
            props,
        }
    }

    pub fn parse_propset(input: &str) -> BenchProps {
        let mut propset = BenchProps::new();
        for tok in input.split(',') {
            if tok.len() == 0 {
                continue;
            }

            // Allow key-only properties.
            let mut kv = tok.splitn(2, '=').collect::<Vec<&str>>();
            while kv.len() < 2 {
                kv.push("");
            }

            propset.insert(kv[0].into(), kv[1].into());
        }
        propset
    }

    // "KIND[:KEY[=VAL][,KEY[=VAL]...]]"
    pub fn parse(spec: &str) -> Result<Self> {
        let mut groups = spec.splitn(2, ':');

        let kind = match groups.next() {
            Some(v) if v.len() > 0 => v,
            _ => bail!("invalid bench kind in {:?}", spec),
        };

        let mut props = match groups.next() {
            Some(group) if group.contains(':') => {
                bail!("only one property group is allowed in {:?}", spec)
            }
            Some(group) => Self::parse_propset(group),
            None => Default::default(),
        };
        let id = props.remove("id");

        Ok(Self::new(kind, id.as_deref(), props))
    }

    pub fn bool_prop(&self, key: &str) -> Result<bool> {
        match self.props.get(key).map(String::as_str) {
            None => Ok(false),
            Some("") | Some("1") | Some("true") | Some("yes") => Ok(true),
            Some("0") | Some("false") | Some("no") => Ok(false),
            Some(v) => bail!("{}: invalid boolean {:?} for {:?}", self, v, key),
        }
    }
}

impl std::fmt::Display for BenchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bench[{}:{}]",
            self.kind,
            self.id.as_deref().unwrap_or("-")
        )
    }
}
