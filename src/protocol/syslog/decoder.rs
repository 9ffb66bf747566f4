use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;
use winnow::combinator::{alt, delimited, fail, opt, preceded, repeat};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{one_of, take_while};
use winnow::{ModalResult, Parser};

use super::message::{Message, NIL, SdElement};

// RFC 5424 §6 header field bounds
const HOSTNAME_MAX: usize = 255;
const APP_NAME_MAX: usize = 48;
const PROCID_MAX: usize = 128;
const MSGID_MAX: usize = 32;
const SD_NAME_MAX: usize = 32;
const PRI_MAX: u32 = 191;
const VERSION_MAX: u32 = 999;

/// Header/body part of an RFC 5424 line, used to locate grammar violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogField {
    Pri,
    Version,
    Timestamp,
    Hostname,
    AppName,
    ProcId,
    MsgId,
    StructuredData,
    Msg,
}

impl SyslogField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyslogField::Pri => "PRI",
            SyslogField::Version => "VERSION",
            SyslogField::Timestamp => "TIMESTAMP",
            SyslogField::Hostname => "HOSTNAME",
            SyslogField::AppName => "APP-NAME",
            SyslogField::ProcId => "PROCID",
            SyslogField::MsgId => "MSGID",
            SyslogField::StructuredData => "STRUCTURED-DATA",
            SyslogField::Msg => "MSG",
        }
    }
}

impl fmt::Display for SyslogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload does not follow the RFC 5424 grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rfc5424 grammar violation: invalid {field} at offset {offset}")]
pub struct GrammarError {
    pub field: SyslogField,
    /// Byte offset (within the payload) where the offending field starts.
    pub offset: usize,
}

/// What could be recovered from a payload that broke the grammar midway.
///
/// `message` is `None` when PRI or VERSION could not be read; otherwise it
/// holds every field decoded before `error.field`, later fields absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMessage {
    pub message: Option<Message>,
    pub error: GrammarError,
}

/// RFC 5424 decoder for a single frame payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyslogDecoder;

impl SyslogDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one payload. A grammar violation yields the partially filled
    /// message together with the error, so callers can pick their policy.
    pub fn decode(&self, payload: &[u8]) -> Result<Message, PartialMessage> {
        let mut input = payload;
        let (pri, version) = match decode_header(&mut input, payload) {
            Ok(head) => head,
            Err(error) => {
                return Err(PartialMessage {
                    message: None,
                    error,
                });
            }
        };
        let mut msg = Message::new(pri, version);
        match decode_body(&mut msg, &mut input, payload) {
            Ok(()) => Ok(msg),
            Err(error) => Err(PartialMessage {
                message: Some(msg),
                error,
            }),
        }
    }
}

fn decode_header(input: &mut &[u8], origin: &[u8]) -> Result<(u8, u16), GrammarError> {
    let pri = step(input, origin, SyslogField::Pri, pri)?;
    let version = step(input, origin, SyslogField::Version, version)?;
    Ok((pri, version))
}

// 逐字段填充：出错时 msg 中保留已解析的字段
fn decode_body(msg: &mut Message, input: &mut &[u8], origin: &[u8]) -> Result<(), GrammarError> {
    msg.timestamp = step(input, origin, SyslogField::Timestamp, preceded(sp, timestamp))?;
    msg.hostname = step(
        input,
        origin,
        SyslogField::Hostname,
        preceded(sp, header_token(HOSTNAME_MAX)),
    )?;
    msg.appname = step(
        input,
        origin,
        SyslogField::AppName,
        preceded(sp, header_token(APP_NAME_MAX)),
    )?;
    msg.procid = step(
        input,
        origin,
        SyslogField::ProcId,
        preceded(sp, header_token(PROCID_MAX)),
    )?;
    msg.msgid = step(
        input,
        origin,
        SyslogField::MsgId,
        preceded(sp, header_token(MSGID_MAX)),
    )?;

    step(input, origin, SyslogField::StructuredData, sp)?;
    if input.first() == Some(&b'-') {
        *input = &input[1..];
    } else {
        loop {
            let element = step(input, origin, SyslogField::StructuredData, sd_element)?;
            msg.structured_data.push(element);
            if input.first() != Some(&b'[') {
                break;
            }
        }
    }

    if input.is_empty() {
        return Ok(());
    }
    step(input, origin, SyslogField::Msg, sp)?;
    if !input.is_empty() {
        msg.message = Some(Bytes::copy_from_slice(input));
        *input = &input[input.len()..];
    }
    Ok(())
}

fn step<'a, O>(
    input: &mut &'a [u8],
    origin: &[u8],
    field: SyslogField,
    mut parser: impl Parser<&'a [u8], O, ErrMode<ContextError>>,
) -> Result<O, GrammarError> {
    let offset = origin.len() - input.len();
    parser
        .parse_next(input)
        .map_err(|_| GrammarError { field, offset })
}

fn ctx_desc(desc: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(desc))
}

fn ascii_number(digits: &[u8]) -> Option<u32> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_print_ascii(c: u8) -> bool {
    (33..=126).contains(&c)
}

fn sp(input: &mut &[u8]) -> ModalResult<()> {
    b' '.void().context(ctx_desc("SP")).parse_next(input)
}

fn pri(input: &mut &[u8]) -> ModalResult<u8> {
    delimited(b'<', take_while(1..=3, is_digit), b'>')
        .verify_map(|d: &[u8]| ascii_number(d).filter(|p| *p <= PRI_MAX).map(|p| p as u8))
        .context(ctx_desc("<PRI> with 1-3 digits, at most 191"))
        .parse_next(input)
}

fn version(input: &mut &[u8]) -> ModalResult<u16> {
    take_while(1.., is_digit)
        .verify_map(|d: &[u8]| {
            ascii_number(d)
                .filter(|v| (1..=VERSION_MAX).contains(v))
                .map(|v| v as u16)
        })
        .context(ctx_desc("VERSION in 1..=999"))
        .parse_next(input)
}

fn timestamp(input: &mut &[u8]) -> ModalResult<Option<DateTime<FixedOffset>>> {
    alt((b'-'.value(None), date_time.map(Some)))
        .context(ctx_desc("TIMESTAMP or '-'"))
        .parse_next(input)
}

fn digits<'a>(count: usize) -> impl Parser<&'a [u8], &'a [u8], ErrMode<ContextError>> {
    take_while(count..=count, is_digit)
}

// FULL-DATE "T" PARTIAL-TIME TIME-OFFSET, TIME-SECFRAC 至多 6 位
fn date_time(input: &mut &[u8]) -> ModalResult<DateTime<FixedOffset>> {
    (
        digits(4),
        b'-',
        digits(2),
        b'-',
        digits(2),
        b'T',
        digits(2),
        b':',
        digits(2),
        b':',
        digits(2),
        opt((b'.', take_while(1..=6, is_digit))),
        alt((
            b'Z'.void(),
            (one_of(|c: u8| c == b'+' || c == b'-'), digits(2), b':', digits(2)).void(),
        )),
    )
        .take()
        .verify_map(|raw: &[u8]| {
            std::str::from_utf8(raw)
                .ok()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        })
        .parse_next(input)
}

fn header_token<'a>(max: usize) -> impl Parser<&'a [u8], Option<String>, ErrMode<ContextError>> {
    take_while(1.., is_print_ascii)
        .verify(move |tok: &[u8]| tok.len() <= max)
        .map(|tok: &[u8]| (tok != NIL.as_bytes()).then(|| String::from_utf8_lossy(tok).into_owned()))
}

fn sd_name(input: &mut &[u8]) -> ModalResult<String> {
    take_while(1..=SD_NAME_MAX, |c: u8| {
        is_print_ascii(c) && !matches!(c, b'=' | b']' | b'"')
    })
    .map(|name: &[u8]| String::from_utf8_lossy(name).into_owned())
    .context(ctx_desc("SD-NAME"))
    .parse_next(input)
}

fn sd_element(input: &mut &[u8]) -> ModalResult<SdElement> {
    let id = preceded(b'[', sd_name).parse_next(input)?;
    let params: Vec<(String, String)> = repeat(0.., preceded(b' ', sd_param)).parse_next(input)?;
    b']'.context(ctx_desc("']'")).parse_next(input)?;
    Ok(SdElement { id, params })
}

fn sd_param(input: &mut &[u8]) -> ModalResult<(String, String)> {
    let name = sd_name.parse_next(input)?;
    (b'=', b'"').void().parse_next(input)?;
    let value = param_value.parse_next(input)?;
    Ok((name, value))
}

// PARAM-VALUE：仅 \" \\ \] 为转义，其余反斜杠原样保留
fn param_value(input: &mut &[u8]) -> ModalResult<String> {
    let bytes = *input;
    let mut value = Vec::with_capacity(bytes.len().min(64));
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                *input = &bytes[i + 1..];
                return Ok(String::from_utf8_lossy(&value).into_owned());
            }
            b'\\' if matches!(bytes.get(i + 1), Some(b'"' | b'\\' | b']')) => {
                value.push(bytes[i + 1]);
                i += 2;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    fail.context(ctx_desc("closing '\"' of PARAM-VALUE"))
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn decode(s: &str) -> Result<Message, PartialMessage> {
        SyslogDecoder::new().decode(s.as_bytes())
    }

    #[test]
    fn decode_full_message() {
        let msg = decode(
            r#"<29>1 2016-02-21T04:32:57+00:00 web1 someservice 2341 2 [origin][meta sequence="14125553" service="someservice"] "GET /v1/ok HTTP/1.1" 200 145"#,
        )
        .expect("well formed");
        assert_eq!(msg.version, 1);
        assert_eq!(msg.facility, 3);
        assert_eq!(msg.severity, 5);
        assert_eq!(
            msg.timestamp.map(|t| t.with_timezone(&Utc)),
            Some(Utc.timestamp_opt(1456029177, 0).unwrap())
        );
        assert_eq!(msg.hostname.as_deref(), Some("web1"));
        assert_eq!(msg.appname.as_deref(), Some("someservice"));
        assert_eq!(msg.procid.as_deref(), Some("2341"));
        assert_eq!(msg.msgid.as_deref(), Some("2"));
        assert_eq!(msg.structured_data.len(), 2);
        assert_eq!(msg.structured_data[0].id, "origin");
        assert!(msg.structured_data[0].params.is_empty());
        assert_eq!(
            msg.structured_data[1].params,
            vec![
                ("sequence".to_string(), "14125553".to_string()),
                ("service".to_string(), "someservice".to_string()),
            ]
        );
        assert_eq!(
            msg.message_str(),
            Some(r#""GET /v1/ok HTTP/1.1" 200 145"#)
        );
    }

    #[test]
    fn nil_fields_are_absent() {
        let msg = decode("<1>1 - - - - - -").expect("minimal");
        assert_eq!(msg.version, 1);
        assert_eq!(msg.severity, 1);
        assert_eq!(msg.facility, 0);
        assert!(msg.timestamp.is_none());
        assert!(msg.hostname.is_none());
        assert!(msg.appname.is_none());
        assert!(msg.procid.is_none());
        assert!(msg.msgid.is_none());
        assert!(msg.structured_data.is_empty());
        assert!(msg.message.is_none());
    }

    #[test]
    fn message_is_taken_verbatim() {
        let msg = decode("<1>3 - - - - - - hello\nworld").unwrap();
        assert_eq!(msg.message_str(), Some("hello\nworld"));
        let msg = decode("<1>1 - - - - - - hellø").unwrap();
        assert_eq!(msg.message.as_deref(), Some("hellø".as_bytes()));
        let msg = decode("<1>1 - - - - - -  two  spaces\t\0").unwrap();
        assert_eq!(msg.message_str(), Some(" two  spaces\t\0"));
    }

    #[test]
    fn message_keeps_invalid_utf8_bytes() {
        let msg = SyslogDecoder::new()
            .decode(b"<1>1 - - - - - - a\xff\xfeb")
            .unwrap();
        assert_eq!(msg.message.as_deref(), Some(&b"a\xff\xfeb"[..]));
        assert!(msg.message_str().is_none());
    }

    #[test]
    fn empty_message_after_separator_is_absent() {
        let msg = decode("<1>1 - - - - - - ").unwrap();
        assert!(msg.message.is_none());
    }

    #[test]
    fn truncated_after_version_keeps_header() {
        let partial = decode("<1>2").unwrap_err();
        assert_eq!(partial.error.field, SyslogField::Timestamp);
        assert_eq!(partial.error.offset, 4);
        let msg = partial.message.expect("pri and version decoded");
        assert_eq!(msg.version, 2);
        assert_eq!(msg.severity, 1);
        assert_eq!(msg.facility, 0);
    }

    #[test]
    fn bad_timestamp_keeps_version() {
        let partial = decode("<1>217 <11>1 - -").unwrap_err();
        assert_eq!(partial.error.field, SyslogField::Timestamp);
        let msg = partial.message.unwrap();
        assert_eq!(msg.version, 217);
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn bad_pri_has_no_message() {
        for input in ["", "1>1 - - - - - -", "<>1", "<1234>1", "<192>1 - - - - - -"] {
            let partial = decode(input).unwrap_err();
            assert_eq!(partial.error.field, SyslogField::Pri, "input {:?}", input);
            assert!(partial.message.is_none());
        }
    }

    #[test]
    fn version_bounds() {
        assert_eq!(decode("<1>0 - - - - - -").unwrap_err().error.field, SyslogField::Version);
        assert_eq!(decode("<1>1000 - - - - - -").unwrap_err().error.field, SyslogField::Version);
        assert_eq!(decode("<1>999 - - - - - -").unwrap().version, 999);
    }

    #[test]
    fn timestamp_fraction_limited_to_microseconds() {
        let msg = decode("<1>1 2017-12-31T23:59:59.999999Z - - - - -").unwrap();
        let ts = msg.timestamp.unwrap().with_timezone(&Utc);
        assert_eq!(ts.timestamp(), 1514764799);
        assert_eq!(ts.timestamp_subsec_nanos(), 999_999_000);

        let partial = decode("<1>1 2017-12-31T23:59:59.9999999Z - - - - -").unwrap_err();
        assert_eq!(partial.error.field, SyslogField::Timestamp);
    }

    #[test]
    fn timestamp_with_offset() {
        let msg = decode("<1>1 2003-08-24T05:14:15.000003-07:00 - - - - -").unwrap();
        let ts = msg.timestamp.unwrap();
        assert_eq!(ts.offset().local_minus_utc(), -7 * 3600);
        assert_eq!(ts.with_timezone(&Utc).timestamp(), 1061727255);
    }

    #[test]
    fn header_field_bounds() {
        let long_app = "a".repeat(49);
        let partial = decode(&format!("<1>1 - host {} - - -", long_app)).unwrap_err();
        assert_eq!(partial.error.field, SyslogField::AppName);
        assert_eq!(partial.message.unwrap().hostname.as_deref(), Some("host"));

        let ok_host = "h".repeat(255);
        let msg = decode(&format!("<1>1 - {} - - - -", ok_host)).unwrap();
        assert_eq!(msg.hostname.as_deref(), Some(ok_host.as_str()));
    }

    #[test]
    fn structured_data_escapes() {
        let msg = decode(r#"<1>1 - - - - - [id k="a\"b\\c\]d\e"]"#).unwrap();
        assert_eq!(msg.structured_data[0].params[0].1, r#"a"b\c]d\e"#);
    }

    #[test]
    fn broken_structured_data_keeps_completed_elements() {
        let partial = decode(r#"<1>1 - - - - - [ok a="1"][broken a="2] tail"#).unwrap_err();
        assert_eq!(partial.error.field, SyslogField::StructuredData);
        let msg = partial.message.unwrap();
        assert_eq!(msg.structured_data.len(), 1);
        assert_eq!(msg.structured_data[0].id, "ok");
        assert!(msg.message.is_none());
    }

    #[test]
    fn missing_space_before_msg_is_violation() {
        let partial = decode(r#"<1>1 - - - - - [a]tail"#).unwrap_err();
        assert_eq!(partial.error.field, SyslogField::Msg);
        assert_eq!(partial.message.unwrap().structured_data.len(), 1);
    }

    #[test]
    fn empty_structured_data_is_violation() {
        let partial = decode("<1>1 - - - - - ").unwrap_err();
        assert_eq!(partial.error.field, SyslogField::StructuredData);
    }
}
