use std::borrow::Cow;

use mailparse::{MailAddr, MailHeader, MailHeaderMap, SingleInfo};

use crate::domain::address::{Address, AddressSet};

/// Header fields that contribute addresses.
pub const ADDRESS_HEADERS: [&str; 3] = ["From", "To", "Cc"];

fn flatten(addrs: &[MailAddr]) -> Vec<Address> {
    fn single(info: &SingleInfo) -> Address {
        Address::new(info.display_name.clone().unwrap_or_default(), info.addr.clone())
    }

    addrs
        .iter()
        .flat_map(|a| match a {
            MailAddr::Single(info) => vec![single(info)],
            MailAddr::Group(group) => group.addrs.iter().map(single).collect(),
        })
        .filter(|a| !a.address().trim().is_empty())
        .collect()
}

/// Parses an address-list header value (`"A, B" <a@x.com>, c@x.com`), as it
/// appears on the wire. RFC 2047 encoded display names are decoded word by
/// word, so an encoded comma stays inside its name.
///
/// Malformed input yields an empty list instead of an error.
pub fn parse_address_list(text: &str) -> Vec<Address> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let line = format!("To: {text}");
    let parsed = mailparse::parse_header(line.as_bytes())
        .and_then(|(header, _)| mailparse::addrparse_header(&header));
    match parsed {
        Ok(list) => flatten(&list),
        Err(e) => {
            log::debug!("skipping unparsable address list {text:?}: {e}");
            Vec::new()
        }
    }
}

// Raw header bytes are UTF-8 per RFC 6532, with latin-1 as the fallback.
fn raw_value<'a>(header: &'a MailHeader<'_>) -> Cow<'a, str> {
    let raw = header.get_value_raw();
    match std::str::from_utf8(raw) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(raw.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Collects every From/To/Cc mailbox from a raw RFC 5322 header block.
pub fn extract_addresses(raw_headers: &[u8], into: &mut AddressSet) {
    let headers = match mailparse::parse_headers(raw_headers) {
        Ok((headers, _)) => headers,
        Err(e) => {
            log::debug!("skipping unparsable header block: {e}");
            return;
        }
    };

    for key in ADDRESS_HEADERS {
        for header in headers.get_all_headers(key) {
            into.extend(parse_address_list(&raw_value(header)));
        }
    }
}
