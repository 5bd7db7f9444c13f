//! PoP claim specification parsing
//!
//! A claim specification is a single comma-separated string of `key=value`
//! pairs, for example `u=/subscriptions/.../managedClusters/aks,extra=1`.
//! The `u` claim names the resource (cluster) the token is bound to and is
//! mandatory.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ClaimsError;

/// Name of the required resource claim
pub const RESOURCE_CLAIM: &str = "u";

/// Validated set of PoP claims
///
/// Always contains a non-empty `u` claim; every key and value is non-empty
/// with surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    claims: HashMap<String, String>,
}

impl ClaimSet {
    /// The value of the `u` claim
    pub fn resource(&self) -> &str {
        // Present by construction
        self.claims
            .get(RESOURCE_CLAIM)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.claims.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.claims.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Never true for a constructed set; provided for API symmetry
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.claims
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.claims
    }
}

/// Parse a claim specification into a [`ClaimSet`]
///
/// Syntax errors are reported before the `u` requirement is checked, so a
/// spec such as `1=2,3=4` yields [`ClaimsError::MissingResource`] while
/// `u=a,broken` yields [`ClaimsError::Malformed`].
pub fn parse_claims(spec: &str) -> Result<ClaimSet, ClaimsError> {
    if spec.trim().is_empty() {
        return Err(ClaimsError::Empty);
    }

    let mut claims = HashMap::new();
    for entry in spec.split(',') {
        let malformed = || ClaimsError::Malformed {
            entry: entry.to_string(),
        };

        let (key, value) = entry.split_once('=').ok_or_else(malformed)?;
        if value.contains('=') {
            return Err(malformed());
        }

        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(malformed());
        }

        if claims.insert(key.to_string(), value.to_string()).is_some() {
            return Err(ClaimsError::Duplicate {
                key: key.to_string(),
            });
        }
    }

    if !claims.contains_key(RESOURCE_CLAIM) {
        return Err(ClaimsError::MissingResource);
    }

    Ok(ClaimSet { claims })
}

impl FromStr for ClaimSet {
    type Err = ClaimsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_claims(s)
    }
}

impl TryFrom<HashMap<String, String>> for ClaimSet {
    type Error = ClaimsError;

    /// Validate an already-split claim map
    fn try_from(map: HashMap<String, String>) -> Result<Self, Self::Error> {
        if map.is_empty() {
            return Err(ClaimsError::Empty);
        }

        let mut claims = HashMap::with_capacity(map.len());
        for (key, value) in map {
            let (k, v) = (key.trim(), value.trim());
            if k.is_empty() || v.is_empty() {
                return Err(ClaimsError::Malformed {
                    entry: format!("{key}={value}"),
                });
            }
            if claims.insert(k.to_string(), v.to_string()).is_some() {
                return Err(ClaimsError::Duplicate { key: k.to_string() });
            }
        }

        if !claims.contains_key(RESOURCE_CLAIM) {
            return Err(ClaimsError::MissingResource);
        }

        Ok(ClaimSet { claims })
    }
}

impl fmt::Display for ClaimSet {
    /// Renders back to specification syntax, keys sorted
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.sort_unstable();
        for (i, (k, v)) in pairs.into_iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_with_additional_claims() {
        let claims = parse_claims("u=val1, claim2=val2, claim3=val3").unwrap();

        assert_eq!(
            claims.as_map(),
            &map(&[("u", "val1"), ("claim2", "val2"), ("claim3", "val3")])
        );
        assert_eq!(claims.resource(), "val1");
    }

    #[test]
    fn test_parse_empty_string() {
        assert_eq!(parse_claims(""), Err(ClaimsError::Empty));
    }

    #[test]
    fn test_parse_whitespace_only() {
        assert_eq!(parse_claims("\t    "), Err(ClaimsError::Empty));
    }

    #[test]
    fn test_entry_without_separator_is_malformed() {
        let err = parse_claims("claim1=val1,claim2").unwrap_err();
        assert!(matches!(err, ClaimsError::Malformed { ref entry } if entry == "claim2"));
        assert!(err
            .to_string()
            .contains("Ensure the claims are formatted as `key=value` with no extra whitespace"));
    }

    #[test]
    fn test_blank_value_is_malformed() {
        assert!(matches!(
            parse_claims("claim1=  "),
            Err(ClaimsError::Malformed { .. })
        ));
    }

    #[test]
    fn test_commas_only_is_malformed() {
        assert!(matches!(
            parse_claims(",,,,,,,,"),
            Err(ClaimsError::Malformed { .. })
        ));
    }

    #[test]
    fn test_double_separator_is_malformed() {
        assert!(matches!(
            parse_claims("u=a=b"),
            Err(ClaimsError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_u_claim() {
        let err = parse_claims("1=2,3=4").unwrap_err();
        assert_eq!(err, ClaimsError::MissingResource);
        assert!(err.to_string().contains("required u-claim not provided"));
    }

    #[test]
    fn test_syntax_checked_before_u_claim() {
        assert!(matches!(
            parse_claims("1=2,oops"),
            Err(ClaimsError::Malformed { .. })
        ));
    }

    #[test]
    fn test_duplicate_claim() {
        assert_eq!(
            parse_claims("u=a,u=b"),
            Err(ClaimsError::Duplicate {
                key: "u".to_string()
            })
        );
    }

    #[test]
    fn test_u_value_is_preserved_verbatim() {
        let arm_id = "/subscriptions/0000/resourceGroups/RG/providers/Microsoft.ContainerService/managedClusters/Aks%20One";
        let claims = parse_claims(&format!(" u = {arm_id} ")).unwrap();

        assert_eq!(claims.resource(), arm_id);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let spec = "u=cluster, nonce=abc";
        assert_eq!(parse_claims(spec).unwrap(), parse_claims(spec).unwrap());
    }

    #[test]
    fn test_display_renders_spec_syntax() {
        let claims: ClaimSet = "u=host,a=1".parse().unwrap();
        assert_eq!(claims.to_string(), "a=1,u=host");
        assert_eq!(parse_claims(&claims.to_string()).unwrap(), claims);
    }

    #[test]
    fn test_try_from_map() {
        let claims = ClaimSet::try_from(map(&[("u", "testhost")])).unwrap();
        assert_eq!(claims.resource(), "testhost");

        assert_eq!(
            ClaimSet::try_from(map(&[("x", "y")])),
            Err(ClaimsError::MissingResource)
        );
        assert_eq!(ClaimSet::try_from(HashMap::new()), Err(ClaimsError::Empty));
        assert!(matches!(
            ClaimSet::try_from(map(&[("u", " ")])),
            Err(ClaimsError::Malformed { .. })
        ));
    }
}
