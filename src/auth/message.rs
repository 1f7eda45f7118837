//! Canonical Sign-In with Ethereum message codec.
//!
//! The text form is what the wallet signs, so rendering must be byte-exact and
//! parsing must reject anything that would not re-render to the same bytes.
//!
//! ```text
//! [scheme "://"] domain " wants you to sign in with your Ethereum account:"
//! address
//!
//! [statement
//! ]
//! URI: uri
//! Version: 1
//! Chain ID: chain-id
//! Nonce: nonce
//! Issued At: rfc3339
//! [Expiration Time: rfc3339]
//! [Not Before: rfc3339]
//! [Request ID: request-id]
//! [Resources:
//! - uri ...]
//! ```

use alloy_primitives::Address;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const PREAMBLE: &str = " wants you to sign in with your Ethereum account:";
const URI_TAG: &str = "URI: ";
const VERSION_TAG: &str = "Version: ";
const CHAIN_ID_TAG: &str = "Chain ID: ";
const NONCE_TAG: &str = "Nonce: ";
const ISSUED_AT_TAG: &str = "Issued At: ";
const EXPIRATION_TIME_TAG: &str = "Expiration Time: ";
const NOT_BEFORE_TAG: &str = "Not Before: ";
const REQUEST_ID_TAG: &str = "Request ID: ";
const RESOURCES_TAG: &str = "Resources:";
const RESOURCE_ITEM: &str = "- ";

/// Minimum nonce length accepted in a message.
pub const MIN_NONCE_LEN: usize = 8;

/// Codec failures. All of them surface as `MalformedMessage` to the handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid {0}: {1}")]
    InvalidField(&'static str, String),

    #[error("unexpected line: {0:?}")]
    UnexpectedLine(String),
}

/// Protocol version literal. Only `1` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    #[default]
    V1,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::V1 => f.write_str("1"),
        }
    }
}

impl FromStr for Version {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Version::V1),
            other => Err(MessageError::InvalidField("version", other.to_string())),
        }
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An RFC 3339 instant that remembers the exact text it was read from.
///
/// Messages produced elsewhere may use offsets or sub-second precision that
/// this crate would not emit itself; keeping the text means a parsed message
/// always renders back to the bytes that were signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp {
    text: String,
    at: DateTime<Utc>,
}

impl Timestamp {
    /// Timestamp at millisecond precision, rendered as `YYYY-MM-DDTHH:MM:SS.sssZ`.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let at = at.trunc_subsecs(3);
        Self {
            text: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            at,
        }
    }

    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let at = DateTime::parse_from_rfc3339(text)
            .map_err(|e| MessageError::InvalidField("timestamp", format!("{}: {}", text, e)))?
            .with_timezone(&Utc);
        Ok(Self {
            text: text.to_string(),
            at,
        })
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = MessageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Timestamp::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.text
    }
}

/// The message an account signs to authenticate.
///
/// Construct with [`AuthChallenge::builder`] or [`parse`]; both enforce the
/// structural invariants, so [`render`] never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    #[serde(skip_serializing_if = "Option::is_none")]
    scheme: Option<String>,
    domain: String,
    #[serde(serialize_with = "serialize_checksummed")]
    address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    statement: Option<String>,
    uri: String,
    version: Version,
    chain_id: u64,
    nonce: String,
    issued_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    not_before: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    resources: Vec<String>,
}

pub(crate) fn serialize_checksummed<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&address.to_checksum(None))
}

impl AuthChallenge {
    /// Start a message with every required field.
    pub fn builder(
        domain: impl Into<String>,
        address: Address,
        uri: impl Into<String>,
        chain_id: u64,
        nonce: impl Into<String>,
        issued_at: Timestamp,
    ) -> AuthChallengeBuilder {
        AuthChallengeBuilder {
            challenge: AuthChallenge {
                scheme: None,
                domain: domain.into(),
                address,
                statement: None,
                uri: uri.into(),
                version: Version::V1,
                chain_id,
                nonce: nonce.into(),
                issued_at,
                expiration_time: None,
                not_before: None,
                request_id: None,
                resources: Vec::new(),
            },
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn issued_at(&self) -> &Timestamp {
        &self.issued_at
    }

    pub fn expiration_time(&self) -> Option<&Timestamp> {
        self.expiration_time.as_ref()
    }

    pub fn not_before(&self) -> Option<&Timestamp> {
        self.not_before.as_ref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }
}

/// Typed builder for [`AuthChallenge`]; optional fields default to absent.
#[derive(Debug, Clone)]
pub struct AuthChallengeBuilder {
    challenge: AuthChallenge,
}

impl AuthChallengeBuilder {
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.challenge.scheme = Some(scheme.into());
        self
    }

    pub fn statement(mut self, statement: impl Into<String>) -> Self {
        self.challenge.statement = Some(statement.into());
        self
    }

    pub fn expiration_time(mut self, at: Timestamp) -> Self {
        self.challenge.expiration_time = Some(at);
        self
    }

    pub fn not_before(mut self, at: Timestamp) -> Self {
        self.challenge.not_before = Some(at);
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.challenge.request_id = Some(request_id.into());
        self
    }

    pub fn resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.challenge.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    /// Validate and produce the message.
    pub fn build(self) -> Result<AuthChallenge, MessageError> {
        let c = self.challenge;

        if let Some(scheme) = &c.scheme {
            let mut chars = scheme.chars();
            let valid = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic())
                && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'));
            if !valid {
                return Err(MessageError::InvalidField("scheme", scheme.clone()));
            }
        }

        if c.domain.is_empty()
            || c.domain.contains(|ch: char| ch.is_whitespace() || ch == '/')
        {
            return Err(MessageError::InvalidField("domain", c.domain));
        }

        if let Some(statement) = &c.statement {
            if statement.contains(['\n', '\r']) {
                return Err(MessageError::InvalidField(
                    "statement",
                    "contains a line terminator".to_string(),
                ));
            }
        }

        validate_uri("uri", &c.uri)?;

        if c.nonce.len() < MIN_NONCE_LEN || !c.nonce.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(MessageError::InvalidField("nonce", c.nonce));
        }

        if let Some(exp) = &c.expiration_time {
            if exp.as_datetime() <= c.issued_at.as_datetime() {
                return Err(MessageError::InvalidField(
                    "expiration time",
                    "must be after issued at".to_string(),
                ));
            }
        }

        if let Some(request_id) = &c.request_id {
            if request_id.contains(|ch: char| ch.is_whitespace()) {
                return Err(MessageError::InvalidField("request id", request_id.clone()));
            }
        }

        for resource in &c.resources {
            validate_uri("resource", resource)?;
        }

        Ok(c)
    }
}

fn validate_uri(field: &'static str, value: &str) -> Result<(), MessageError> {
    if value.is_empty() || value.contains(|ch: char| ch.is_whitespace()) {
        return Err(MessageError::InvalidField(field, value.to_string()));
    }
    url::Url::parse(value).map_err(|e| MessageError::InvalidField(field, format!("{}: {}", value, e)))?;
    Ok(())
}

/// Render the canonical text form.
pub fn render(challenge: &AuthChallenge) -> String {
    challenge.to_string()
}

impl fmt::Display for AuthChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        writeln!(f, "{}{}", self.domain, PREAMBLE)?;
        writeln!(f, "{}\n", self.address.to_checksum(None))?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
        }
        f.write_str("\n")?;
        writeln!(f, "{}{}", URI_TAG, self.uri)?;
        writeln!(f, "{}{}", VERSION_TAG, self.version)?;
        writeln!(f, "{}{}", CHAIN_ID_TAG, self.chain_id)?;
        writeln!(f, "{}{}", NONCE_TAG, self.nonce)?;
        write!(f, "{}{}", ISSUED_AT_TAG, self.issued_at)?;
        if let Some(exp) = &self.expiration_time {
            write!(f, "\n{}{}", EXPIRATION_TIME_TAG, exp)?;
        }
        if let Some(nbf) = &self.not_before {
            write!(f, "\n{}{}", NOT_BEFORE_TAG, nbf)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "\n{}{}", REQUEST_ID_TAG, request_id)?;
        }
        if !self.resources.is_empty() {
            write!(f, "\n{}", RESOURCES_TAG)?;
            for resource in &self.resources {
                write!(f, "\n{}{}", RESOURCE_ITEM, resource)?;
            }
        }
        Ok(())
    }
}

/// Parse the canonical text form.
pub fn parse(text: &str) -> Result<AuthChallenge, MessageError> {
    let mut lines = text.split('\n').peekable();
    let mut next = |field: &'static str| lines.next().ok_or(MessageError::MissingField(field));

    let header = next("domain")?;
    let origin = header
        .strip_suffix(PREAMBLE)
        .ok_or(MessageError::MissingField("domain"))?;
    let (scheme, domain) = match origin.split_once("://") {
        Some((scheme, domain)) => (Some(scheme), domain),
        None => (None, origin),
    };

    let address_line = next("address")?;
    let address = Address::parse_checksummed(address_line, None)
        .map_err(|e| MessageError::InvalidField("address", format!("{}: {}", address_line, e)))?;

    let blank = next("address")?;
    if !blank.is_empty() {
        return Err(MessageError::UnexpectedLine(blank.to_string()));
    }

    // A present statement (even an empty one) is followed by a blank line; an
    // absent one leaves a single blank line before the URI.
    let first = next("uri")?;
    let second = next("uri")?;
    let (statement, uri_line) = if second.is_empty() {
        (Some(first), next("uri")?)
    } else if first.is_empty() {
        (None, second)
    } else {
        return Err(MessageError::InvalidField(
            "statement",
            "spans multiple lines".to_string(),
        ));
    };

    let uri = tagged(uri_line, URI_TAG, "uri")?;
    let version: Version = tagged(next("version")?, VERSION_TAG, "version")?.parse()?;
    let chain_id = parse_chain_id(tagged(next("chain id")?, CHAIN_ID_TAG, "chain id")?)?;
    let nonce = tagged(next("nonce")?, NONCE_TAG, "nonce")?;
    let issued_at = Timestamp::parse(tagged(next("issued at")?, ISSUED_AT_TAG, "issued at")?)?;

    let expiration_time = lines
        .next_if(|l| l.starts_with(EXPIRATION_TIME_TAG))
        .map(|l| Timestamp::parse(&l[EXPIRATION_TIME_TAG.len()..]))
        .transpose()?;
    let not_before = lines
        .next_if(|l| l.starts_with(NOT_BEFORE_TAG))
        .map(|l| Timestamp::parse(&l[NOT_BEFORE_TAG.len()..]))
        .transpose()?;
    let request_id = lines
        .next_if(|l| l.starts_with(REQUEST_ID_TAG))
        .map(|l| l[REQUEST_ID_TAG.len()..].to_string());

    let mut resources = Vec::new();
    if lines.next_if(|l| *l == RESOURCES_TAG).is_some() {
        while let Some(item) = lines.next_if(|l| l.starts_with(RESOURCE_ITEM)) {
            resources.push(item[RESOURCE_ITEM.len()..].to_string());
        }
        if resources.is_empty() {
            return Err(MessageError::InvalidField("resources", "empty list".to_string()));
        }
    }

    if let Some(extra) = lines.next() {
        return Err(MessageError::UnexpectedLine(extra.to_string()));
    }

    let mut builder = AuthChallenge::builder(domain, address, uri, chain_id, nonce, issued_at);
    builder.challenge.version = version;
    if let Some(scheme) = scheme {
        builder = builder.scheme(scheme);
    }
    if let Some(statement) = statement {
        builder = builder.statement(statement);
    }
    if let Some(exp) = expiration_time {
        builder = builder.expiration_time(exp);
    }
    if let Some(nbf) = not_before {
        builder = builder.not_before(nbf);
    }
    if let Some(request_id) = request_id {
        builder = builder.request_id(request_id);
    }
    builder.resources(resources).build()
}

impl FromStr for AuthChallenge {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

fn tagged<'a>(line: &'a str, tag: &str, field: &'static str) -> Result<&'a str, MessageError> {
    line.strip_prefix(tag)
        .ok_or(MessageError::MissingField(field))
}

fn parse_chain_id(value: &str) -> Result<u64, MessageError> {
    let canonical = !value.is_empty()
        && value.chars().all(|c| c.is_ascii_digit())
        && (value == "0" || !value.starts_with('0'));
    if !canonical {
        return Err(MessageError::InvalidField("chain id", value.to_string()));
    }
    value
        .parse()
        .map_err(|_| MessageError::InvalidField("chain id", value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";

    fn issued() -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(2021, 9, 30, 16, 25, 24).unwrap())
    }

    fn address() -> Address {
        WETH.parse().unwrap()
    }

    fn minimal() -> AuthChallengeBuilder {
        AuthChallenge::builder(
            "service.org",
            address(),
            "https://service.org/login",
            1,
            "32891757",
            issued(),
        )
    }

    fn full() -> AuthChallenge {
        minimal()
            .scheme("https")
            .statement("I accept the ServiceOrg Terms of Service: https://service.org/tos")
            .expiration_time(Timestamp::parse("2021-09-30T16:35:24.000Z").unwrap())
            .not_before(Timestamp::parse("2021-09-30T16:20:00+02:00").unwrap())
            .request_id("req-42")
            .resources([
                "ipfs://bafybeiemxf5abjwjbikoz4mc3a3dla6ual3jsgpdr4cjr3oz3evfyavhwq/",
                "https://example.com/my-web2-claim.json",
            ])
            .build()
            .unwrap()
    }

    #[test]
    fn test_render_with_statement() {
        let challenge = minimal()
            .statement("I accept the ServiceOrg Terms of Service: https://service.org/tos")
            .build()
            .unwrap();

        let expected = "service.org wants you to sign in with your Ethereum account:\n\
0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2\n\
\n\
I accept the ServiceOrg Terms of Service: https://service.org/tos\n\
\n\
URI: https://service.org/login\n\
Version: 1\n\
Chain ID: 1\n\
Nonce: 32891757\n\
Issued At: 2021-09-30T16:25:24.000Z";
        assert_eq!(render(&challenge), expected);
    }

    #[test]
    fn test_render_without_statement() {
        let challenge = minimal().build().unwrap();
        let text = render(&challenge);
        assert!(text.contains("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2\n\n\nURI: "));
    }

    #[test]
    fn test_render_lowercase_input_is_checksummed() {
        let lower: Address = WETH.to_lowercase().parse().unwrap();
        let challenge = AuthChallenge::builder("a.org", lower, "https://a.org", 1, "abcdefgh1", issued())
            .build()
            .unwrap();
        assert!(render(&challenge).contains(WETH));
    }

    #[test]
    fn test_round_trip_full() {
        let challenge = full();
        let text = render(&challenge);
        assert!(text.starts_with("https://service.org wants you"));
        assert!(text.ends_with("- https://example.com/my-web2-claim.json"));
        assert_eq!(parse(&text).unwrap(), challenge);
    }

    #[test]
    fn test_round_trip_minimal() {
        let challenge = minimal().build().unwrap();
        assert_eq!(parse(&render(&challenge)).unwrap(), challenge);
    }

    #[test]
    fn test_empty_statement_distinct_from_absent() {
        let absent = minimal().build().unwrap();
        let empty = minimal().statement("").build().unwrap();

        let absent_text = render(&absent);
        let empty_text = render(&empty);
        assert_ne!(absent_text, empty_text);

        assert_eq!(parse(&absent_text).unwrap().statement(), None);
        assert_eq!(parse(&empty_text).unwrap().statement(), Some(""));
    }

    #[test]
    fn test_offset_timestamp_preserved() {
        let challenge = full();
        let text = render(&challenge);
        assert!(text.contains("Not Before: 2021-09-30T16:20:00+02:00"));
        let parsed = parse(&text).unwrap();
        assert_eq!(
            parsed.not_before().unwrap().as_datetime(),
            Utc.with_ymd_and_hms(2021, 9, 30, 14, 20, 0).unwrap()
        );
        assert_eq!(render(&parsed), text);
    }

    #[test]
    fn test_from_datetime_truncates_to_millis() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let ts = Timestamp::from_datetime(at);
        assert_eq!(ts.as_str(), "2023-11-14T22:13:20.123Z");
        assert_eq!(Timestamp::parse(ts.as_str()).unwrap(), ts);
    }

    #[test]
    fn test_parse_missing_nonce() {
        let text = render(&minimal().build().unwrap());
        let broken: String = text
            .lines()
            .filter(|l| !l.starts_with("Nonce: "))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(matches!(
            parse(&broken),
            Err(MessageError::MissingField("nonce"))
        ));
    }

    #[test]
    fn test_parse_multiline_statement_rejected() {
        let text = render(&minimal().statement("line one").build().unwrap());
        let broken = text.replace("line one", "line one\nline two");
        assert!(matches!(
            parse(&broken),
            Err(MessageError::InvalidField("statement", _))
        ));
    }

    #[test]
    fn test_builder_rejects_line_terminator_in_statement() {
        assert!(minimal().statement("a\r\nb").build().is_err());
        assert!(minimal().statement("a\nb").build().is_err());
    }

    #[test]
    fn test_parse_bad_version() {
        let text = render(&minimal().build().unwrap()).replace("Version: 1", "Version: 2");
        assert!(matches!(
            parse(&text),
            Err(MessageError::InvalidField("version", _))
        ));
    }

    #[test]
    fn test_parse_bad_chain_id() {
        let base = render(&minimal().build().unwrap());
        for bad in ["abc", "-1", "+1", "01", ""] {
            let text = base.replace("Chain ID: 1", &format!("Chain ID: {}", bad));
            assert!(parse(&text).is_err(), "chain id {:?} accepted", bad);
        }
    }

    #[test]
    fn test_parse_rejects_unchecksummed_address() {
        let text = render(&minimal().build().unwrap()).replace(WETH, &WETH.to_lowercase());
        assert!(matches!(
            parse(&text),
            Err(MessageError::InvalidField("address", _))
        ));
    }

    #[test]
    fn test_parse_rejects_trailing_newline() {
        let text = format!("{}\n", render(&minimal().build().unwrap()));
        assert!(matches!(parse(&text), Err(MessageError::UnexpectedLine(_))));
    }

    #[test]
    fn test_parse_rejects_out_of_order_fields() {
        let challenge = minimal()
            .expiration_time(Timestamp::parse("2021-09-30T17:00:00.000Z").unwrap())
            .request_id("r1")
            .build()
            .unwrap();
        let text = render(&challenge);
        let mut lines: Vec<&str> = text.lines().collect();
        let n = lines.len();
        lines.swap(n - 1, n - 2);
        assert!(parse(&lines.join("\n")).is_err());
    }

    #[test]
    fn test_parse_rejects_empty_resources() {
        let text = format!("{}\nResources:", render(&minimal().build().unwrap()));
        assert!(matches!(
            parse(&text),
            Err(MessageError::InvalidField("resources", _))
        ));
    }

    #[test]
    fn test_builder_rejects_short_nonce() {
        let result = AuthChallenge::builder("a.org", address(), "https://a.org", 1, "abc", issued()).build();
        assert!(matches!(result, Err(MessageError::InvalidField("nonce", _))));
    }

    #[test]
    fn test_builder_rejects_inverted_window() {
        let result = minimal()
            .expiration_time(Timestamp::parse("2021-09-30T16:25:24.000Z").unwrap())
            .build();
        assert!(matches!(
            result,
            Err(MessageError::InvalidField("expiration time", _))
        ));
    }

    #[test]
    fn test_builder_rejects_bad_uri() {
        let result = AuthChallenge::builder("a.org", address(), "not a uri", 1, "abcdefgh1", issued()).build();
        assert!(matches!(result, Err(MessageError::InvalidField("uri", _))));
    }

    #[test]
    fn test_serialize_json() {
        let json = serde_json::to_value(full()).unwrap();
        assert_eq!(json["address"], WETH);
        assert_eq!(json["chainId"], 1);
        assert_eq!(json["version"], "1");
        assert_eq!(json["issuedAt"], "2021-09-30T16:25:24.000Z");
        assert_eq!(json["resources"].as_array().unwrap().len(), 2);

        let minimal_json = serde_json::to_value(minimal().build().unwrap()).unwrap();
        assert!(minimal_json.get("statement").is_none());
        assert!(minimal_json.get("resources").is_none());
    }
}
