use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dt_core::{
    Action, ActionKind, ApplyContext, Request, Response, Rule, RuleSet, Selector, StaticFetcher, ThemeCache,
    ThemeConfig, ThemeLog, ThemeRef, Transform,
};

const THEME: &str = include_str!("../../../demos/theme.html");

fn content_page(paragraphs: usize) -> String {
    let mut body = String::from("<html><head><title>Bench</title></head><body><div id=content>");
    for i in 0..paragraphs {
        body.push_str(&format!("<p class=item>Paragraph {i} with <a href=\"/p/{i}\">a link</a></p>"));
    }
    body.push_str("</div><div id=nav><ul><li>one</li><li>two</li></ul></div></body></html>");
    body
}

fn ruleset() -> RuleSet {
    let action = |kind, content: &str, theme: &str| {
        let t = Transform::new(Selector::parse(content).unwrap(), Selector::parse(theme).unwrap());
        Action::transform(kind, t).unwrap()
    };
    let rule = Rule::new(
        vec![],
        vec![
            action(ActionKind::Replace, "children:#content", "children:#main"),
            action(ActionKind::Append, "#nav ul || /html/body/div[2]", "children:#sidebar"),
        ],
    );
    RuleSet::new(vec![], vec![rule], Some(ThemeRef::new("/theme.html")))
}

fn bench_selectors(c: &mut Criterion) {
    let doc = dt_core::parse_html(&content_page(200));
    let css = Selector::parse("#content p.item a").unwrap();
    let xpath = Selector::parse("//div[@id='content']/p[position() > 10]").unwrap();

    c.bench_function("selector_css", |b| b.iter(|| black_box(css.evaluate(black_box(&doc)))));
    c.bench_function("selector_xpath", |b| b.iter(|| black_box(xpath.evaluate(black_box(&doc)))));
}

fn bench_apply(c: &mut Criterion) {
    let fetcher = StaticFetcher::new().with("http://example.com/theme.html", THEME);
    let config = ThemeConfig::default();
    let cache = ThemeCache::new(Duration::from_secs(3600));
    let rules = ruleset();
    let request = Request::new("http://example.com/page").unwrap();
    let page = content_page(50);

    c.bench_function("apply_rules_cached", |b| {
        let ctx = ApplyContext::new(&config, &fetcher).with_cache(&cache);
        b.iter(|| {
            let mut log = ThemeLog::new();
            black_box(rules.apply_rules(&request, Response::html(page.as_str()), &ctx, &mut log))
        })
    });

    c.bench_function("apply_rules_uncached", |b| {
        let ctx = ApplyContext::new(&config, &fetcher);
        b.iter(|| {
            let mut log = ThemeLog::new();
            black_box(rules.apply_rules(&request, Response::html(page.as_str()), &ctx, &mut log))
        })
    });
}

criterion_group!(benches, bench_selectors, bench_apply);
criterion_main!(benches);
