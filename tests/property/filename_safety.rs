//! Property-based tests: rendered filenames stay inside the download directory

use picka::environment::Environment;
use picka::template::escape::{escape_path, escape_variable};
use picka::template::{RenderMode, Template};
use proptest::prelude::*;

fn assert_relative(path: &str) {
    assert!(!path.starts_with('/'), "absolute path: {:?}", path);
    assert!(!path.contains('\\'), "backslash in {:?}", path);
    if path.is_empty() {
        return;
    }
    for component in path.split('/') {
        assert!(!component.is_empty(), "empty component in {:?}", path);
        assert_ne!(component, ".");
        assert_ne!(component, "..");
    }
}

/// Escaped paths never climb out of or escape the root
#[test]
fn test_escape_path_is_relative() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&"[a-zA-Z0-9 ./\\\\:*?<>|\\x00-\\x1f]{0,40}", |input| {
            let escaped = escape_path(&input);
            assert_relative(&escaped);
            for component in escaped.split('/').filter(|c| !c.is_empty()) {
                assert!(!component.ends_with('.'));
                assert!(!component.ends_with(' '));
                assert!(!component.starts_with(' '));
            }
            Ok(())
        })
        .unwrap();
}

/// Escaped variables never carry separators or control characters
#[test]
fn test_escape_variable_has_no_structure() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<String>(), |value| {
            let escaped = escape_variable(&value);
            assert!(!escaped.contains('/'));
            assert!(!escaped.contains('\\'));
            assert!(!escaped.chars().any(char::is_control));
            Ok(())
        })
        .unwrap();
}

/// Placeholder values cannot add directories to a pattern
#[test]
fn test_values_cannot_add_directories() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let template = Template::compile("${pageTitle}/${name}${ext}", RenderMode::Property).unwrap();

    runner
        .run(
            &(any::<String>(), "[a-z./\\\\]{0,12}", "\\.?[a-z/]{0,4}"),
            |(title, name, ext)| {
                let mut env = Environment::new();
                env.set("pageTitle", title.as_str());
                env.set("name", name.as_str());
                env.set("ext", ext.as_str());

                let rendered = template.render(&env).unwrap();
                assert_relative(&rendered);
                prop_assert!(rendered.matches('/').count() <= 1);
                Ok(())
            },
        )
        .unwrap();
}
