use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref NON_SLUG: Regex = Regex::new(r"[^\w\-]+").unwrap();
    static ref MULTI_DASH: Regex = Regex::new(r"-{2,}").unwrap();
    static ref EMAIL: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref PHONE: Regex = Regex::new(r"^[6-9]\d{9}$").unwrap();
    static ref PINCODE: Regex = Regex::new(r"^[1-9][0-9]{5}$").unwrap();
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// URL slug from a display name: lowercase, dashes for whitespace,
/// everything else stripped.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let dashed = WHITESPACE.replace_all(&lowered, "-");
    let cleaned = NON_SLUG.replace_all(&dashed, "");
    let collapsed = MULTI_DASH.replace_all(&cleaned, "-");
    collapsed.trim_matches('-').to_string()
}

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..36)] as char)
        .collect()
}

/// Order numbers: "DBS" + base36 millisecond timestamp + 4 random chars,
/// uppercased. Doubles as the payment-gateway receipt id.
pub fn generate_order_number() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u128;
    format!("DBS{}{}", to_base36(millis), random_base36(4)).to_uppercase()
}

/// Random 6-digit login code, left-padded with zeros.
pub fn generate_otp() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub fn generate_sku(category: &str, name: &str) -> String {
    let cat: String = category.chars().take(3).collect();
    let nam: String = name.chars().take(3).collect();
    format!("{}-{}-{}", cat, nam, random_base36(4)).to_uppercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// 10-digit Indian mobile number
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE.is_match(phone)
}

pub fn is_valid_pincode(pincode: &str) -> bool {
    PINCODE.is_match(pincode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Brass Diya Lamp"), "brass-diya-lamp");
        assert_eq!(slugify("  Sandalwood  Incense  "), "sandalwood-incense");
    }

    #[test]
    fn test_slugify_strips_punctuation() {
        assert_eq!(slugify("Ganesha Idol (Large)!"), "ganesha-idol-large");
        assert_eq!(slugify("--already--dashed--"), "already-dashed");
    }

    #[test]
    fn test_order_number_shape() {
        let number = generate_order_number();
        assert!(number.starts_with("DBS"));
        assert!(number.len() > 10);
        assert!(number.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_order_numbers_differ() {
        assert_ne!(generate_order_number(), generate_order_number());
    }

    #[test]
    fn test_otp_is_six_digits() {
        for _ in 0..50 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_sku_shape() {
        let sku = generate_sku("Pooja", "Thali");
        assert!(sku.starts_with("POO-THA-"));
        assert_eq!(sku.len(), 12);
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("9876543210"));
        assert!(!is_valid_phone("1234567890")); // must start 6-9
        assert!(!is_valid_phone("98765"));
    }

    #[test]
    fn test_pincode_validation() {
        assert!(is_valid_pincode("411001"));
        assert!(!is_valid_pincode("041100"));
        assert!(!is_valid_pincode("41100"));
    }
}
