//! S3 locations and IAM role ARNs, which we need to splice into `COPY`
//! statements as SQL literals.

use lazy_static::lazy_static;
use regex::Regex;

use crate::prelude::*;

/// Parse an S3 URL into a bucket and a (possibly empty) key.
pub fn parse_s3_url(url: &str) -> Result<(&str, &str)> {
    // lazy_static allows us to compile this regex only once.
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^s3://(?P<bucket>[a-z0-9][a-z0-9.-]*)(?:/(?P<key>[^\\\x00-\x1f]*))?$")
                .expect("couldn't parse built-in regex");
    }

    let caps = RE
        .captures(url)
        .ok_or_else(|| format_err!("the URL {:?} could not be parsed", url))?;
    let bucket = caps
        .name("bucket")
        .expect("missing hard-coded capture???")
        .as_str();
    let key = caps.name("key").map(|m| m.as_str()).unwrap_or("");

    Ok((bucket, key))
}

/// Check that `arn` looks like an IAM role ARN.
pub fn validate_role_arn(arn: &str) -> Result<()> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^arn:aws[a-z-]*:iam::[0-9]{12}:role/[A-Za-z0-9+=,.@_/-]+$")
                .expect("couldn't parse built-in regex");
    }

    if RE.is_match(arn) {
        Ok(())
    } else {
        Err(format_err!("{:?} is not an IAM role ARN", arn))
    }
}

#[test]
fn url_parsing() {
    assert_eq!(parse_s3_url("s3://top-level").unwrap(), ("top-level", ""));
    assert_eq!(parse_s3_url("s3://top-level/").unwrap(), ("top-level", ""));
    assert_eq!(
        parse_s3_url("s3://udacity-dend/log_data").unwrap(),
        ("udacity-dend", "log_data"),
    );
    assert_eq!(
        parse_s3_url("s3://udacity-dend/song_data/A/").unwrap(),
        ("udacity-dend", "song_data/A/"),
    );
    assert!(parse_s3_url("gs://foo/").is_err());
    assert!(parse_s3_url("s3://").is_err());
    assert!(parse_s3_url("s3://Bucket/key").is_err());
    assert!(parse_s3_url("s3://bucket/with\\backslash").is_err());
    assert!(parse_s3_url("s3://bucket/line\nbreak").is_err());
}

#[test]
fn arn_validation() {
    assert!(validate_role_arn("arn:aws:iam::123456789012:role/dwhRole").is_ok());
    assert!(validate_role_arn("arn:aws:iam::123456789012:role/service/dwh-role").is_ok());
    assert!(validate_role_arn("arn:aws:iam::123456789012:user/dwhRole").is_err());
    assert!(validate_role_arn("arn:aws:iam::12345:role/dwhRole").is_err());
    assert!(validate_role_arn("arn:aws:iam::123456789012:role/x' OR '1'='1").is_err());
}
