//! Built-in technology signature catalog, used when no external signature
//! file is configured.

use super::engine::TechSignature;

fn sig(
    name: &str,
    category: &str,
    header: &[&str],
    cookie: &[&str],
    body: &[&str],
    script: &[&str],
    meta: &[&str],
) -> TechSignature {
    let to_vec = |patterns: &[&str]| patterns.iter().map(|s| s.to_string()).collect();
    TechSignature {
        name: name.to_string(),
        category: category.to_string(),
        header_regex: to_vec(header),
        cookie_regex: to_vec(cookie),
        body_regex: to_vec(body),
        script_regex: to_vec(script),
        meta_regex: to_vec(meta),
    }
}

pub fn catalog() -> Vec<TechSignature> {
    vec![
        sig("WordPress", "CMS", &[], &[], &["wp-content", "wp-includes"], &[], &["WordPress"]),
        sig("Drupal", "CMS", &["X-Drupal-Cache"], &[r"SESS[a-z0-9]{32}"], &[r"Drupal\.settings"], &[], &[]),
        sig("Joomla", "CMS", &[], &[], &["/components/com_"], &[], &["Joomla"]),
        sig("Nginx", "Web Server", &["nginx"], &[], &[], &[], &[]),
        sig("Apache", "Web Server", &["Apache"], &[], &[], &[], &[]),
        sig("Cloudflare", "CDN", &["CF-RAY", "__cfduid"], &["__cfduid"], &[], &[], &[]),
        sig("PHP", "Programming Language", &["X-Powered-By.*PHP", "PHP/"], &["PHPSESSID"], &[], &[], &[]),
        sig("Node.js", "Programming Language", &["X-Powered-By.*Express"], &[], &[], &[], &[]),
        sig("React", "JavaScript Framework", &[], &[], &["data-reactroot", "_react", "__REACT"], &[r"react\.js", r"react\.min\.js"], &[]),
        sig("Vue.js", "JavaScript Framework", &[], &[], &["data-v-", "__vue__"], &[r"vue\.js", r"vue\.min\.js"], &[]),
        sig("Angular", "JavaScript Framework", &[], &[], &["ng-version", "ng-app"], &[r"angular\.js"], &[]),
        sig("Next.js", "JavaScript Framework", &[], &[], &["__NEXT_DATA__", "_next/static"], &["_next/static"], &[]),
        sig("jQuery", "JavaScript Library", &[], &[], &[], &[r"jquery\.js", r"jquery\.min\.js"], &[]),
        sig("Bootstrap", "UI Framework", &[], &[], &[r"bootstrap\.css", r"bootstrap\.min\.css"], &[r"bootstrap\.js"], &[]),
        sig("Laravel", "Web Framework", &[], &["laravel_session"], &["laravel"], &[], &[]),
        sig("Django", "Web Framework", &["X-Frame-Options.*SAMEORIGIN"], &["csrftoken", "sessionid"], &[], &[], &[]),
        sig("Ruby on Rails", "Web Framework", &["X-Powered-By.*Phusion Passenger"], &["_.*_session"], &[], &[], &[]),
        sig("Express", "Web Framework", &["X-Powered-By.*Express"], &[], &[], &[], &[]),
        sig("Jenkins", "CI/CD", &["X-Jenkins"], &[], &["Jenkins"], &[], &[]),
        sig("Grafana", "Monitoring", &[], &["grafana_session"], &["grafana"], &[], &[]),
        sig("Fastly", "CDN", &["X-Served-By.*cache", "Fastly"], &[], &[], &[], &[]),
        sig("Amazon CloudFront", "CDN", &["X-Amz-Cf-Id", "CloudFront"], &[], &[], &[], &[]),
        sig("Google Analytics", "Analytics", &[], &[], &[], &[r"google-analytics\.com/analytics\.js", r"googletagmanager\.com/gtag"], &[]),
        sig("Stripe", "Payment", &[], &[], &[], &[r"js\.stripe\.com"], &[]),
        sig("PayPal", "Payment", &[], &[], &[], &[r"paypal\.com/sdk"], &[]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_unique_names() {
        let sigs = catalog();
        assert_eq!(sigs.len(), 25);
        let mut names: Vec<_> = sigs.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 25);
    }

    #[test]
    fn every_signature_has_at_least_one_pattern() {
        for sig in catalog() {
            let patterns = sig.header_regex.len()
                + sig.cookie_regex.len()
                + sig.body_regex.len()
                + sig.script_regex.len()
                + sig.meta_regex.len();
            assert!(patterns > 0, "{} has no patterns", sig.name);
        }
    }
}
