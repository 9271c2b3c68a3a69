//! Synthetic per-request identity headers.
//!
//! Upstream services correlate traffic by user agent, client IP and device id.
//! Each attempt gets a freshly drawn set so retries do not look identical.

use crate::constants::{BMS_REFERER, KHALTI_ORIGIN};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

const KHALTI_DEVICE_MODELS: [&str; 5] = ["Pixel 4", "Nexus 5", "Moto G5", "Galaxy S7", "Redmi Note 8"];
const BMS_ANDROID_VERSIONS: [&str; 5] = ["10", "11", "12", "13", "14"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProfile {
    /// No synthetic headers
    #[default]
    Plain,
    /// Android web-view identity expected by the Khalti API
    KhaltiMobile,
    /// Mixed iOS / Android / Windows browser identity for BookMyShow
    BookMyShow,
}

impl IdentityProfile {
    /// Draws a fresh header set. `has_json_body` adds the JSON content type.
    pub fn headers(&self, has_json_body: bool) -> Vec<(String, String)> {
        let mut rng = rand::thread_rng();
        let mut headers = Vec::new();
        match self {
            IdentityProfile::Plain => {}
            IdentityProfile::KhaltiMobile => {
                headers.push(("accept".into(), "application/json, text/plain, */*".into()));
                headers.push(("deviceid".into(), random_device_id()));
                headers.push(("origin".into(), KHALTI_ORIGIN.into()));
                headers.push(("referer".into(), KHALTI_ORIGIN.into()));
                headers.push(("user-agent".into(), khalti_user_agent(&mut rng)));
                headers.push(("x-forwarded-for".into(), random_ip(&mut rng)));
            }
            IdentityProfile::BookMyShow => {
                headers.push(("User-Agent".into(), bookmyshow_user_agent(&mut rng)));
                headers.push(("Accept".into(), "application/json, text/plain, */*".into()));
                headers.push(("Referer".into(), BMS_REFERER.into()));
                headers.push(("Connection".into(), "keep-alive".into()));
            }
        }
        if has_json_body && *self != IdentityProfile::Plain {
            let content_type = match self {
                IdentityProfile::BookMyShow => "application/json;charset=UTF-8",
                _ => "application/json",
            };
            headers.push(("content-type".into(), content_type.into()));
        }
        headers
    }
}

/// Four random octets.
pub fn random_ip<R: Rng>(rng: &mut R) -> String {
    let octets: Vec<String> = (0..4).map(|_| rng.gen_range(0..=255u8).to_string()).collect();
    octets.join(".")
}

/// Fixed `kwa-` prefix plus 16 random hex characters.
pub fn random_device_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("kwa-{}", &hex[..16])
}

fn khalti_user_agent<R: Rng>(rng: &mut R) -> String {
    let chrome = rng.gen_range(120..=135);
    let android = rng.gen_range(6..=11);
    let model = KHALTI_DEVICE_MODELS.choose(rng).copied().unwrap_or("Pixel 4");
    format!(
        "Mozilla/5.0 (Linux; Android {android}; {model}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{chrome}.0.0.0 Mobile Safari/537.36"
    )
}

fn bookmyshow_user_agent<R: Rng>(rng: &mut R) -> String {
    match rng.gen_range(0..3) {
        0 => format!(
            "Mozilla/5.0 (iPhone; CPU iPhone OS {}_{} like Mac OS X) Version/{}.0 Mobile Safari/604.1",
            rng.gen_range(15..=18),
            rng.gen_range(0..=7),
            rng.gen_range(16..=18)
        ),
        1 => format!(
            "Mozilla/5.0 (Linux; Android {}) Chrome/{} Mobile Safari/537.36",
            BMS_ANDROID_VERSIONS.choose(rng).copied().unwrap_or("13"),
            rng.gen_range(110..=125)
        ),
        _ => format!(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/{} Safari/537.36",
            rng.gen_range(110..=125)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn khalti_profile_carries_device_and_forwarded_ip() {
        let headers = IdentityProfile::KhaltiMobile.headers(true);
        let device = header(&headers, "deviceid").unwrap();
        assert!(device.starts_with("kwa-"));
        assert_eq!(device.len(), 20);

        let ip = header(&headers, "x-forwarded-for").unwrap();
        let octets: Vec<&str> = ip.split('.').collect();
        assert_eq!(octets.len(), 4);
        assert!(octets.iter().all(|o| o.parse::<u8>().is_ok()));

        assert!(header(&headers, "user-agent").unwrap().contains("Android"));
        assert_eq!(header(&headers, "content-type"), Some("application/json"));
    }

    #[test]
    fn bookmyshow_profile_sets_referer() {
        let headers = IdentityProfile::BookMyShow.headers(false);
        assert_eq!(header(&headers, "referer"), Some(BMS_REFERER));
        assert!(header(&headers, "content-type").is_none());
        assert!(header(&headers, "user-agent").unwrap().starts_with("Mozilla/5.0"));
    }

    #[test]
    fn plain_profile_is_empty() {
        assert!(IdentityProfile::Plain.headers(true).is_empty());
    }
}
