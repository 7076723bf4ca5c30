// services/signature.rs
//
// Click.uz signs every callback with an MD5 over a fixed concatenation of the
// request fields and the shared secret. The complete callback inserts the
// merchant_prepare_id between merchant_trans_id and amount; the prepare
// callback omits it.
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMode {
    Prepare,
    Complete,
}

/// Borrowed view of the fields that participate in the signature, all in the
/// exact string form the gateway supplied them.
#[derive(Debug)]
pub struct SignFields<'a> {
    pub click_trans_id: &'a str,
    pub service_id: &'a str,
    pub merchant_trans_id: &'a str,
    pub merchant_prepare_id: Option<&'a str>,
    pub amount: &'a str,
    pub action: &'a str,
    pub sign_time: &'a str,
    pub sign_string: &'a str,
}

/// Lowercase hex MD5 of the canonical field concatenation. Returns `None`
/// when `merchant_prepare_id` is missing in complete mode.
pub fn compute_sign(fields: &SignFields<'_>, mode: SignMode, secret: &str) -> Option<String> {
    let mut raw = String::new();
    raw.push_str(fields.click_trans_id);
    raw.push_str(fields.service_id);
    raw.push_str(secret);
    raw.push_str(fields.merchant_trans_id);
    if mode == SignMode::Complete {
        raw.push_str(fields.merchant_prepare_id?);
    }
    raw.push_str(fields.amount);
    raw.push_str(fields.action);
    raw.push_str(fields.sign_time);

    Some(format!("{:x}", md5::compute(raw.as_bytes())))
}

/// Never panics and never errors; a missing field counts as a failed check.
/// The diagnostics deliberately omit the secret.
pub fn verify_sign(fields: &SignFields<'_>, mode: SignMode, secret: &str) -> bool {
    match compute_sign(fields, mode, secret) {
        Some(calc_sign) => {
            let is_valid = calc_sign == fields.sign_string;
            if !is_valid {
                warn!(
                    "Invalid signature for {}: expected {}, got {}",
                    fields.merchant_trans_id, calc_sign, fields.sign_string
                );
            }
            is_valid
        }
        None => {
            warn!(
                "Missing merchant_prepare_id in complete callback for {}",
                fields.merchant_trans_id
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key";

    fn fields(sign_string: &str) -> SignFields<'_> {
        SignFields {
            click_trans_id: "123456789",
            service_id: "22222",
            merchant_trans_id: "TG_12345_1700000000",
            merchant_prepare_id: Some("TG_12345_1700000000"),
            amount: "10000",
            action: "0",
            sign_time: "2023-11-14 12:00:00",
            sign_string,
        }
    }

    fn md5_hex(raw: &str) -> String {
        format!("{:x}", md5::compute(raw.as_bytes()))
    }

    #[test]
    fn prepare_sign_matches_canonical_concatenation() {
        let expected = md5_hex(&format!(
            "123456789{}{}TG_12345_1700000000{}{}{}",
            "22222", SECRET, "10000", "0", "2023-11-14 12:00:00"
        ));
        let f = fields(&expected);
        assert_eq!(
            compute_sign(&f, SignMode::Prepare, SECRET).as_deref(),
            Some(expected.as_str())
        );
        assert!(verify_sign(&f, SignMode::Prepare, SECRET));
    }

    #[test]
    fn complete_sign_includes_prepare_id() {
        let expected = md5_hex(&format!(
            "123456789{}{}TG_12345_1700000000TG_12345_1700000000{}{}{}",
            "22222", SECRET, "10000", "1", "2023-11-14 12:05:00"
        ));
        let f = SignFields {
            action: "1",
            sign_time: "2023-11-14 12:05:00",
            sign_string: &expected,
            ..fields("")
        };
        assert!(verify_sign(&f, SignMode::Complete, SECRET));
        // The same payload must not verify in prepare mode.
        assert!(!verify_sign(&f, SignMode::Prepare, SECRET));
    }

    #[test]
    fn single_character_mutation_fails() {
        let good = compute_sign(&fields(""), SignMode::Prepare, SECRET).unwrap();
        for i in 0..good.len() {
            let mut bad = good.clone().into_bytes();
            bad[i] = if bad[i] == b'0' { b'1' } else { b'0' };
            let bad = String::from_utf8(bad).unwrap();
            assert!(!verify_sign(&fields(&bad), SignMode::Prepare, SECRET));
        }
        assert!(verify_sign(&fields(&good), SignMode::Prepare, SECRET));
    }

    #[test]
    fn wrong_secret_fails() {
        let good = compute_sign(&fields(""), SignMode::Prepare, SECRET).unwrap();
        assert!(!verify_sign(&fields(&good), SignMode::Prepare, "another_secret"));
    }

    #[test]
    fn missing_prepare_id_fails_in_complete_mode() {
        let mut f = fields("whatever");
        f.merchant_prepare_id = None;
        assert_eq!(compute_sign(&f, SignMode::Complete, SECRET), None);
        assert!(!verify_sign(&f, SignMode::Complete, SECRET));
        // Prepare mode does not need it.
        assert!(compute_sign(&f, SignMode::Prepare, SECRET).is_some());
    }
}
