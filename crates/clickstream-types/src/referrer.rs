//! Reference sites that arriving visitors claim to come from.

use rand::Rng;

/// Referrers attached to arrival events: search engines, social networks,
/// and news sites.
pub const SAMPLE_REFERRERS: &[&str] = &[
    // Search engines
    "http://www.google.com/",
    "http://www.bing.com/",
    "http://www.yahoo.com/",
    "http://www.baidu.com/",
    "http://www.aol.com/",
    "http://www.ask.com/",
    "http://www.altavista.com/",
    "http://www.live.com/",
    "http://www.msn.com/",
    // Social networks
    "http://www.facebook.com/",
    "http://www.twitter.com/",
    "http://www.linkedin.com/",
    "http://www.pinterest.com/",
    "http://www.instagram.com/",
    "http://www.youtube.com/",
    // News sites
    "http://www.cnn.com/",
    "http://www.bbc.co.uk/",
    "http://www.nytimes.com/",
    "http://www.washingtonpost.com/",
    "http://www.reddit.com/",
    "http://www.huffingtonpost.com/",
    "http://www.theguardian.com/",
    "http://www.theverge.com/",
];

/// Pick a referrer uniformly at random from [`SAMPLE_REFERRERS`].
pub fn random_referrer<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    let idx = rng.random_range(0..SAMPLE_REFERRERS.len());
    SAMPLE_REFERRERS.get(idx).copied().unwrap_or("http://www.google.com/")
}
