//! WebAssembly bindings for Dovetail

use std::sync::{OnceLock, PoisonError, RwLock};
use std::time::Duration;

use wasm_bindgen::prelude::*;

use dt_compiler::{compile_ruleset, lint_ruleset};
use dt_core::{
    ApplyContext, HeaderMap, Level, LogEntry, Request, Response, RuleSet, StaticFetcher, ThemeCache, ThemeConfig,
    ThemeLog,
};

#[derive(Default)]
struct ThemerState {
    ruleset: Option<RuleSet>,
    resources: StaticFetcher,
    config: ThemeConfig,
}

static THEMER_STATE: RwLock<Option<ThemerState>> = RwLock::new(None);
static THEME_CACHE: OnceLock<ThemeCache> = OnceLock::new();

fn theme_cache(ttl_secs: u64) -> &'static ThemeCache {
    THEME_CACHE.get_or_init(|| ThemeCache::new(Duration::from_secs(ttl_secs)))
}

struct PageResult {
    html: String,
    themed: bool,
    classes: Option<Vec<String>>,
    log: ThemeLog,
}

fn load_ruleset_inner(xml: &str, source: &str) -> Result<usize, String> {
    let ruleset = compile_ruleset(xml, source).map_err(|e| format!("Failed to load ruleset: {}", e))?;
    let rules = ruleset.rules.len();
    let mut state = THEMER_STATE.write().unwrap_or_else(PoisonError::into_inner);
    state.get_or_insert_with(ThemerState::default).ruleset = Some(ruleset);
    // Resources may have changed under the same URLs along with the rules.
    if let Some(cache) = THEME_CACHE.get() {
        cache.clear();
    }
    Ok(rules)
}

fn add_resource_inner(url: &str, body: &str) {
    let mut state = THEMER_STATE.write().unwrap_or_else(PoisonError::into_inner);
    state
        .get_or_insert_with(ThemerState::default)
        .resources
        .insert(url, body.as_bytes().to_vec());
    if let Some(cache) = THEME_CACHE.get() {
        cache.clear();
    }
}

fn theme_page_inner(url: &str, content_html: &str, content_type: Option<&str>) -> Result<PageResult, String> {
    let guard = THEMER_STATE.read().unwrap_or_else(PoisonError::into_inner);
    let Some((state, ruleset)) = guard.as_ref().and_then(|s| Some((s, s.ruleset.as_ref()?))) else {
        return Err("No ruleset loaded. Call load_ruleset first.".to_string());
    };

    let request = Request::new(url).map_err(|e| e.to_string())?;
    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", content_type.unwrap_or("text/html"));
    let response = Response::new(200, headers, content_html.as_bytes().to_vec());

    let cache = theme_cache(state.config.theme_cache_ttl_secs);
    let ctx = ApplyContext::new(&state.config, &state.resources).with_cache(cache);

    let mut classify_log = ThemeLog::new();
    let classes = ruleset.classify(&request, &response, &ctx, &mut classify_log).ok();

    let mut log = ThemeLog::new();
    let themed = ruleset.apply_rules(&request, response.clone(), &ctx, &mut log);
    let changed = themed != response;
    Ok(PageResult {
        html: String::from_utf8_lossy(&themed.body).into_owned(),
        themed: changed,
        classes,
        log,
    })
}

fn check_ruleset_inner(xml: &str) -> (bool, Vec<String>) {
    match compile_ruleset(xml, "ruleset") {
        Ok(mut ruleset) => (true, lint_ruleset(&mut ruleset).warnings),
        Err(e) => (false, vec![e.to_string()]),
    }
}

fn mirror_to_console(entries: &[LogEntry]) {
    for entry in entries {
        let line = JsValue::from_str(&format!("dovetail: {} ({})", entry.message, entry.source));
        match entry.level {
            Level::Error => web_sys::console::error_1(&line),
            Level::Warn => web_sys::console::warn_1(&line),
            _ => {}
        }
    }
}

fn set(target: &js_sys::Object, key: &str, value: &JsValue) {
    let _ = js_sys::Reflect::set(target, &key.into(), value);
}

fn string_array<'a>(values: impl IntoIterator<Item = &'a String>) -> js_sys::Array {
    values.into_iter().map(|v| JsValue::from_str(v)).collect()
}

/// Compile and install a ruleset, replacing any previous one.
#[wasm_bindgen]
pub fn load_ruleset(xml: &str, source: &str) -> Result<usize, JsValue> {
    load_ruleset_inner(xml, source).map_err(|e| {
        web_sys::console::error_1(&JsValue::from_str(&e));
        JsValue::from_str(&e)
    })
}

/// Make `body` available to the engine under the absolute `url`.
#[wasm_bindgen]
pub fn add_resource(url: &str, body: &str) {
    add_resource_inner(url, body);
}

#[wasm_bindgen]
pub fn is_loaded() -> bool {
    THEMER_STATE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .is_some_and(|s| s.ruleset.is_some())
}

/// Theme one page. Returns `{html, themed, classes, log}`; `classes` is
/// `null` when a match aborted theming.
#[wasm_bindgen]
pub fn theme_page(url: &str, content_html: &str, content_type: Option<String>) -> Result<JsValue, JsValue> {
    let page = theme_page_inner(url, content_html, content_type.as_deref()).map_err(|e| JsValue::from_str(&e))?;
    mirror_to_console(page.log.entries());

    let result = js_sys::Object::new();
    set(&result, "html", &JsValue::from_str(&page.html));
    set(&result, "themed", &JsValue::from(page.themed));
    match &page.classes {
        Some(classes) => set(&result, "classes", &string_array(classes).into()),
        None => set(&result, "classes", &JsValue::NULL),
    }
    if let Some(theme) = page.log.theme_url() {
        set(&result, "themeUrl", &JsValue::from_str(theme));
    }

    let log = js_sys::Array::new();
    for entry in page.log.entries() {
        let item = js_sys::Object::new();
        let level = match entry.level {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        };
        set(&item, "level", &JsValue::from_str(level));
        set(&item, "source", &JsValue::from_str(&entry.source));
        set(&item, "message", &JsValue::from_str(&entry.message));
        log.push(&item);
    }
    set(&result, "log", &log.into());
    Ok(result.into())
}

/// Compile and lint without installing. Returns `{ok, warnings}`.
#[wasm_bindgen]
pub fn check_ruleset(xml: &str) -> JsValue {
    let (ok, warnings) = check_ruleset_inner(xml);
    let result = js_sys::Object::new();
    set(&result, "ok", &JsValue::from(ok));
    set(&result, "warnings", &string_array(&warnings).into());
    result.into()
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn check_ruleset_returns_object() {
        let result = check_ruleset("<ruleset><theme href=\"/t.html\" /></ruleset>");
        let ok = js_sys::Reflect::get(&result, &"ok".into()).unwrap();
        assert_eq!(ok.as_bool(), Some(true));
        let warnings = js_sys::Array::from(&js_sys::Reflect::get(&result, &"warnings".into()).unwrap());
        assert_eq!(warnings.length(), 0);
    }

    #[wasm_bindgen_test]
    fn check_ruleset_reports_syntax_errors() {
        let result = check_ruleset("<ruleset><rule><swap /></rule></ruleset>");
        let ok = js_sys::Reflect::get(&result, &"ok".into()).unwrap();
        assert_eq!(ok.as_bool(), Some(false));
    }
}
