/*
 * mailcore - crypt module
 *
 * Copyright 2024 mailcore contributors
 *
 * This file is part of mailcore.
 *
 * mailcore is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * mailcore is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with mailcore. If not, see <http://www.gnu.org/licenses/>.
 */

//! Security classification of a message from its MIME structure.
//!
//! Nothing here touches keys or signatures: the index only needs to know
//! which messages claim to be signed or encrypted.

use crate::email::{Body, ContentType};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct SecurityFlags: u16 {
        const ENCRYPT     = 1 << 0;
        const SIGN        = 1 << 1;
        /// The signature was verified.
        const GOODSIGN    = 1 << 2;
        const BADSIGN     = 1 << 3;
        /// Only some parts carry a good signature.
        const PARTSIGN    = 1 << 4;
        const SIGNOPAQUE  = 1 << 5;
        /// Contains a public key.
        const KEYBLOCK    = 1 << 6;
        const INLINE      = 1 << 7;
        const PGP         = 1 << 8;
        const SMIME       = 1 << 9;
    }
}

fn is_pkcs7(subtype: &str) -> bool {
    matches!(subtype, "pkcs7-mime" | "x-pkcs7-mime")
}

fn is_pkcs7_signature(subtype: &str) -> bool {
    matches!(subtype, "pkcs7-signature" | "x-pkcs7-signature")
}

fn query_leaf(body: &Body) -> SecurityFlags {
    match (body.content_type, body.subtype.as_str()) {
        (ContentType::Application, "pgp-encrypted") => SecurityFlags::ENCRYPT | SecurityFlags::PGP,
        (ContentType::Application, "pgp-keys") => SecurityFlags::KEYBLOCK | SecurityFlags::PGP,
        (ContentType::Application, "pgp-signature") => SecurityFlags::SIGN | SecurityFlags::PGP,
        (ContentType::Application, "pgp") => match body.parameter("x-action") {
            Some(a) if a.starts_with("sign") => {
                SecurityFlags::SIGN | SecurityFlags::PGP | SecurityFlags::INLINE
            }
            _ => SecurityFlags::ENCRYPT | SecurityFlags::PGP | SecurityFlags::INLINE,
        },
        (ContentType::Application, s) if is_pkcs7(s) => {
            match body.parameter("smime-type").map(str::to_ascii_lowercase).as_deref() {
                Some("signed-data") => {
                    SecurityFlags::SIGN | SecurityFlags::SIGNOPAQUE | SecurityFlags::SMIME
                }
                _ => SecurityFlags::ENCRYPT | SecurityFlags::SMIME,
            }
        }
        _ => SecurityFlags::empty(),
    }
}

/// Classify `body` and everything below it.
pub fn crypt_query(body: &Body) -> SecurityFlags {
    if body.content_type != ContentType::Multipart {
        if let Some(e) = body.email.as_ref() {
            return crypt_query(&e.body);
        }
        return query_leaf(body);
    }
    let protocol = body
        .parameter("protocol")
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match body.subtype.as_str() {
        "signed" => match protocol.as_str() {
            "application/pgp-signature" => SecurityFlags::SIGN | SecurityFlags::PGP,
            p if p
                .strip_prefix("application/")
                .map_or(false, is_pkcs7_signature) =>
            {
                SecurityFlags::SIGN | SecurityFlags::SMIME
            }
            _ => SecurityFlags::SIGN,
        },
        "encrypted" if protocol == "application/pgp-encrypted" => {
            SecurityFlags::ENCRYPT | SecurityFlags::PGP
        }
        _ => {
            // Flags every part shares, plus anything some part has; a good
            // signature only counts when every part has one.
            let mut all = SecurityFlags::all();
            let mut any = SecurityFlags::empty();
            for part in &body.parts {
                let flags = crypt_query(part);
                all &= flags;
                any |= flags;
            }
            if body.parts.is_empty() {
                all = SecurityFlags::empty();
            }
            let mut ret = all | (any - SecurityFlags::GOODSIGN);
            if any.contains(SecurityFlags::GOODSIGN) && !all.contains(SecurityFlags::GOODSIGN) {
                ret |= SecurityFlags::PARTSIGN;
            }
            ret
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(ct: ContentType, subtype: &str) -> Body {
        Body {
            content_type: ct,
            subtype: subtype.to_string(),
            ..Body::default()
        }
    }

    #[test]
    fn test_crypt_query() {
        let mut signed = leaf(ContentType::Multipart, "signed");
        signed
            .parameters
            .push(("protocol".into(), "application/pgp-signature".into()));
        assert_eq!(crypt_query(&signed), SecurityFlags::SIGN | SecurityFlags::PGP);

        let mut smime = leaf(ContentType::Application, "pkcs7-mime");
        smime
            .parameters
            .push(("smime-type".into(), "enveloped-data".into()));
        assert_eq!(crypt_query(&smime), SecurityFlags::ENCRYPT | SecurityFlags::SMIME);

        let mut mixed = leaf(ContentType::Multipart, "mixed");
        mixed.parts.push(leaf(ContentType::Text, "plain"));
        mixed.parts.push(leaf(ContentType::Application, "pgp-keys"));
        assert_eq!(crypt_query(&mixed), SecurityFlags::KEYBLOCK | SecurityFlags::PGP);

        assert!(crypt_query(&leaf(ContentType::Text, "plain")).is_empty());
    }
}
