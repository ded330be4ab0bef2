use std::path::Path;

use proptest::prelude::*;
use watchrun::watch::Pattern;

const BASE: &str = "/work";

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,7}"
}

fn compile(src: &str) -> Pattern {
    Pattern::compile_in(src, Path::new(BASE)).expect("pattern should compile")
}

proptest! {
    // `**/` spans any number of whole directories, including none.
    #[test]
    fn double_star_matches_at_any_depth(
        dirs in proptest::collection::vec(segment(), 0..6),
        name in segment(),
    ) {
        let pattern = compile("src/**/*.rs");
        let mut path = String::from("/work/src/");
        for dir in &dirs {
            path.push_str(dir);
            path.push('/');
        }
        path.push_str(&name);
        path.push_str(".rs");
        prop_assert!(pattern.is_match(&path), "{} should match {}", pattern.as_regex(), path);
    }

    // A single `*` stays within one segment.
    #[test]
    fn single_star_never_crosses_a_separator(
        dirs in proptest::collection::vec(segment(), 1..4),
        name in segment(),
    ) {
        let pattern = compile("*.txt");
        let path = format!("/work/{}/{}.txt", dirs.join("/"), name);
        prop_assert!(!pattern.is_match(&path));
        let direct = format!("/work/{name}.txt");
        prop_assert!(pattern.is_match(&direct));
    }

    // Regex metacharacters in a glob are literals.
    #[test]
    fn metacharacters_are_literal(
        head in segment(),
        meta in "[.+()\\[\\]{}^$]{1,6}",
    ) {
        let name = format!("{head}{meta}");
        let pattern = compile(&name);
        let exact = format!("/work/{name}");
        prop_assert!(pattern.is_match(&exact));
        let extended = format!("{exact}x");
        prop_assert!(!pattern.is_match(&extended));
    }

    // Every alternative is anchored on its own.
    #[test]
    fn alternatives_are_each_anchored(a in segment(), b in segment()) {
        prop_assume!(a != b);
        let pattern = compile(&format!("{a}.js|{b}.css"));
        let js = format!("/work/{a}.js");
        let css = format!("/work/{b}.css");
        let js_tail = format!("{js}.map");
        let css_prefixed = format!("/other{css}");
        prop_assert!(pattern.is_match(&js));
        prop_assert!(pattern.is_match(&css));
        prop_assert!(!pattern.is_match(&js_tail));
        prop_assert!(!pattern.is_match(&css_prefixed));
    }
}

#[test]
fn question_mark_is_one_non_space_character() {
    let pattern = compile("file?.txt");
    assert!(pattern.is_match("/work/file1.txt"));
    assert!(!pattern.is_match("/work/file .txt"));
    assert!(!pattern.is_match("/work/file.txt"));
    assert!(!pattern.is_match("/work/file12.txt"));
}

#[test]
fn double_star_without_separator_is_rejected() {
    assert!(Pattern::compile_in("src/**.rs", Path::new(BASE)).is_err());
    assert!(Pattern::compile_in("**", Path::new(BASE)).is_err());
}

#[test]
fn raw_regex_is_not_anchored() {
    let pattern = compile(r"%\.go$");
    assert!(pattern.is_match("/anywhere/at/all/main.go"));
    assert!(!pattern.is_match("/anywhere/main.go.bak"));
}
