use super::rules::BotCategory;

/// User agent fragments of HTTP libraries, CLI tools and headless browsers.
const AUTOMATED_SIGNATURES: &[&str] = &[
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "python-httpx",
    "aiohttp",
    "go-http-client",
    "java/",
    "okhttp",
    "libwww-perl",
    "httpie",
    "axios/",
    "node-fetch",
    "undici",
    "postmanruntime",
    "insomnia",
    "scrapy",
    "headlesschrome",
    "phantomjs",
    "selenium",
    "puppeteer",
    "playwright",
];

/// Self-declared crawlers. Not verified, so never more than likely.
const CRAWLER_SIGNATURES: &[&str] = &["bot", "crawler", "spider", "slurp", "crawl", "fetcher"];

const BROWSER_ENGINES: &[&str] = &["applewebkit", "gecko/", "trident/", "presto/"];

/// Classify a client from its `User-Agent` header.
pub fn classify_user_agent(user_agent: Option<&str>) -> BotCategory {
    let ua = match user_agent.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua.to_ascii_lowercase(),
        _ => return BotCategory::Automated,
    };

    if AUTOMATED_SIGNATURES.iter().any(|sig| ua.contains(sig)) {
        return BotCategory::Automated;
    }
    if CRAWLER_SIGNATURES.iter().any(|sig| ua.contains(sig)) {
        return BotCategory::LikelyAutomated;
    }
    if ua.starts_with("mozilla/") && BROWSER_ENGINES.iter().any(|engine| ua.contains(engine)) {
        return BotCategory::LikelyNotABot;
    }
    BotCategory::NotAnalyzed
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

    #[test]
    fn test_missing_user_agent_is_automated() {
        assert_eq!(classify_user_agent(None), BotCategory::Automated);
        assert_eq!(classify_user_agent(Some("   ")), BotCategory::Automated);
    }

    #[test]
    fn test_tools_are_automated() {
        for ua in [
            "curl/8.4.0",
            "Wget/1.21.4",
            "python-requests/2.31.0",
            "Go-http-client/1.1",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/120.0.0.0 Safari/537.36",
        ] {
            assert_eq!(classify_user_agent(Some(ua)), BotCategory::Automated, "{}", ua);
        }
    }

    #[test]
    fn test_crawlers_are_likely_automated() {
        let googlebot =
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
        assert_eq!(
            classify_user_agent(Some(googlebot)),
            BotCategory::LikelyAutomated
        );
    }

    #[test]
    fn test_browsers_and_unknown() {
        assert_eq!(classify_user_agent(Some(CHROME)), BotCategory::LikelyNotABot);
        assert_eq!(
            classify_user_agent(Some(
                "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0"
            )),
            BotCategory::LikelyNotABot
        );
        assert_eq!(
            classify_user_agent(Some("MyInternalApp/3.2")),
            BotCategory::NotAnalyzed
        );
    }
}
