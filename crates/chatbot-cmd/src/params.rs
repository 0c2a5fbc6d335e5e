//! Parameter declarations and resolution
//!
//! Commands declare their parameters by converter type name. At
//! registration time each declaration is checked and its type names are
//! swapped for live converters; at dispatch time [`resolve_parameters`]
//! walks the declarations in order, reading tokens from the invocation's
//! [`TokenView`].
//!
//! | kind          | token missing        | conversion fails                 |
//! |---------------|----------------------|----------------------------------|
//! | `Required`    | `MissingArguments`   | `Conversion`                     |
//! | `Optional`    | binds `None`         | undo, binds `None`               |
//! | `OneOf`       | `MissingArguments`   | undo, next type; all fail → `BadUnionArgument` |
//! | `RestOfInput` | binds `""`           | `Conversion`                     |

use std::panic::{self, AssertUnwindSafe};

use anyhow::anyhow;

use crate::args::{ArgValue, Arguments};
use crate::converters::{ConvertContext, ConverterRef, ConverterRegistry};
use crate::error::{panic_message, CmdResult, CommandError, RegResult, RegistrationError};
use crate::view::TokenView;

/// How a parameter consumes input
///
/// `C` is a type name while declaring and a converter once registered.
#[derive(Debug, Clone)]
pub enum ParamKind<C = ConverterRef> {
    /// Exactly one token
    Required(C),
    /// One token if present and convertible
    Optional(C),
    /// One token, converted by the first type that accepts it
    OneOf(Vec<C>),
    /// Everything left, verbatim
    RestOfInput(C),
}

/// A named parameter
#[derive(Debug, Clone)]
pub struct Parameter<C = ConverterRef> {
    pub name: String,
    pub kind: ParamKind<C>,
}

/// A parameter as declared on a command builder
pub type ParamDecl = Parameter<String>;

impl ParamDecl {
    pub fn required(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Required(type_name.into()),
        }
    }

    pub fn optional(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Optional(type_name.into()),
        }
    }

    pub fn one_of<I, S>(name: impl Into<String>, type_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: ParamKind::OneOf(type_names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn rest(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::RestOfInput(type_name.into()),
        }
    }
}

impl Parameter {
    /// Type names this parameter accepts, for diagnostics and help
    pub fn type_names(&self) -> Vec<String> {
        match &self.kind {
            ParamKind::Required(c) | ParamKind::Optional(c) | ParamKind::RestOfInput(c) => {
                vec![c.type_name().to_string()]
            }
            ParamKind::OneOf(cs) => cs.iter().map(|c| c.type_name().to_string()).collect(),
        }
    }

    /// Usage fragment: `<name>`, `[name]` or `<name...>`
    pub fn usage(&self) -> String {
        match &self.kind {
            ParamKind::Required(_) | ParamKind::OneOf(_) => format!("<{}>", self.name),
            ParamKind::Optional(_) => format!("[{}]", self.name),
            ParamKind::RestOfInput(_) => format!("<{}...>", self.name),
        }
    }
}

/// Check declarations and bind their converters
pub fn bind_parameters(
    command: &str,
    decls: Vec<ParamDecl>,
    registry: &ConverterRegistry,
) -> RegResult<Vec<Parameter>> {
    let count = decls.len();
    let mut bound: Vec<Parameter> = Vec::with_capacity(count);

    for (position, decl) in decls.into_iter().enumerate() {
        if bound.iter().any(|p| p.name == decl.name) {
            return Err(RegistrationError::DuplicateParameter {
                command: command.to_string(),
                parameter: decl.name,
            });
        }

        let lookup = |type_name: &str| {
            registry
                .get(type_name)
                .ok_or_else(|| RegistrationError::UnknownConverter {
                    command: command.to_string(),
                    parameter: decl.name.clone(),
                    type_name: type_name.to_string(),
                })
        };

        let kind = match &decl.kind {
            ParamKind::Required(t) => ParamKind::Required(lookup(t)?),
            ParamKind::Optional(t) => ParamKind::Optional(lookup(t)?),
            ParamKind::RestOfInput(t) => {
                if position + 1 != count {
                    return Err(RegistrationError::RestOfInputNotLast {
                        command: command.to_string(),
                        parameter: decl.name.clone(),
                    });
                }
                ParamKind::RestOfInput(lookup(t)?)
            }
            ParamKind::OneOf(ts) => {
                if ts.is_empty() {
                    return Err(RegistrationError::EmptyUnion {
                        command: command.to_string(),
                        parameter: decl.name.clone(),
                    });
                }
                ParamKind::OneOf(ts.iter().map(|t| lookup(t)).collect::<RegResult<_>>()?)
            }
        };

        bound.push(Parameter {
            name: decl.name,
            kind,
        });
    }

    Ok(bound)
}

// =============================================================================
// Resolution
// =============================================================================

fn convert(
    param: &Parameter,
    converter: &ConverterRef,
    ctx: &ConvertContext<'_>,
    raw: &str,
) -> CmdResult<ArgValue> {
    panic::catch_unwind(AssertUnwindSafe(|| converter.convert(ctx, raw)))
        .unwrap_or_else(|payload| {
            Err(anyhow!("converter panicked: {}", panic_message(payload.as_ref())))
        })
        .map_err(|source| CommandError::Conversion {
            parameter: param.name.clone(),
            type_name: converter.type_name().to_string(),
            source,
        })
}

/// Read one quoted word and convert it
fn read_and_convert(
    param: &Parameter,
    converter: &ConverterRef,
    view: &mut TokenView,
    ctx: &ConvertContext<'_>,
) -> CmdResult<ArgValue> {
    let raw = view
        .read_quoted_word()?
        .ok_or_else(|| CommandError::MissingArguments {
            command: ctx.command.to_string(),
            parameter: param.name.clone(),
        })?;
    convert(param, converter, ctx, &raw)
}

/// Bind `params` from the text left in `view`
///
/// With `ignore_extra` off, input remaining after the last parameter is an
/// error. The view is left wherever resolution stopped.
pub fn resolve_parameters(
    params: &[Parameter],
    ignore_extra: bool,
    view: &mut TokenView,
    ctx: &ConvertContext<'_>,
) -> CmdResult<Arguments> {
    let mut args = Arguments::new();

    for param in params {
        view.skip_whitespace();

        if view.eof() {
            match &param.kind {
                ParamKind::Optional(_) => {
                    args.push(param.name.as_str(), ArgValue::None);
                    continue;
                }
                ParamKind::RestOfInput(_) => {
                    args.push(param.name.as_str(), ArgValue::Str(String::new()));
                    continue;
                }
                ParamKind::Required(_) | ParamKind::OneOf(_) => {
                    return Err(CommandError::MissingArguments {
                        command: ctx.command.to_string(),
                        parameter: param.name.clone(),
                    });
                }
            }
        }

        let value = match &param.kind {
            ParamKind::Required(converter) => read_and_convert(param, converter, view, ctx)?,
            ParamKind::RestOfInput(converter) => {
                let rest = view.read_rest();
                convert(param, converter, ctx, &rest)?
            }
            ParamKind::Optional(converter) => match read_and_convert(param, converter, view, ctx) {
                Ok(value) => value,
                Err(err) => {
                    log::debug!("{}: optional {} left unset: {}", ctx.command, param.name, err);
                    view.undo();
                    ArgValue::None
                }
            },
            ParamKind::OneOf(converters) => {
                let mut bound = None;
                for converter in converters {
                    match read_and_convert(param, converter, view, ctx) {
                        Ok(value) => {
                            bound = Some(value);
                            break;
                        }
                        Err(_) => view.undo(),
                    }
                }
                match bound {
                    Some(value) => value,
                    None => {
                        let argument = view.read_word().unwrap_or_default();
                        view.undo();
                        return Err(CommandError::BadUnionArgument {
                            parameter: param.name.clone(),
                            types: param.type_names(),
                            argument,
                        });
                    }
                }
            }
        };

        args.push(param.name.as_str(), value);
    }

    if !ignore_extra {
        view.skip_whitespace();
        if !view.eof() {
            return Err(CommandError::TooManyArguments {
                command: ctx.command.to_string(),
            });
        }
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NoIdentities;
    use crate::invocation::{Channel, ChatMessage, Identity, Platform};
    use std::time::Duration;

    fn bind(decls: Vec<ParamDecl>) -> Vec<Parameter> {
        bind_parameters("test", decls, &ConverterRegistry::with_builtins()).unwrap()
    }

    fn resolve(decls: Vec<ParamDecl>, ignore_extra: bool, text: &str) -> (CmdResult<Arguments>, TokenView) {
        let params = bind(decls);
        let msg = ChatMessage::new(
            Identity::new("1", "u"),
            text,
            Channel::public(Platform::Twitch),
            Duration::ZERO,
        );
        let ctx = ConvertContext {
            message: &msg,
            command: "test",
            identities: &NoIdentities,
        };
        let mut view = TokenView::new(text);
        let result = resolve_parameters(&params, ignore_extra, &mut view, &ctx);
        (result, view)
    }

    #[test]
    fn test_required_and_rest() {
        let (args, _) = resolve(
            vec![ParamDecl::required("n", "int"), ParamDecl::rest("msg", "str")],
            true,
            "5 hello world",
        );
        let args = args.unwrap();
        assert_eq!(args.get_int("n"), Some(5));
        assert_eq!(args.get_str("msg"), Some("hello world"));
    }

    #[test]
    fn test_rest_keeps_quotes() {
        let (args, _) = resolve(vec![ParamDecl::rest("msg", "str")], true, r#"say "hi there""#);
        assert_eq!(args.unwrap().get_str("msg"), Some(r#"say "hi there""#));
    }

    #[test]
    fn test_rest_at_eof_is_empty() {
        let (args, _) = resolve(vec![ParamDecl::rest("msg", "str")], true, "   ");
        assert_eq!(args.unwrap().get_str("msg"), Some(""));
    }

    #[test]
    fn test_missing_required() {
        let (err, _) = resolve(vec![ParamDecl::required("n", "int")], true, "");
        assert!(matches!(
            err.unwrap_err(),
            CommandError::MissingArguments { ref parameter, .. } if parameter == "n"
        ));
    }

    #[test]
    fn test_required_conversion_failure() {
        let (err, _) = resolve(vec![ParamDecl::required("n", "int")], true, "abc");
        match err.unwrap_err() {
            CommandError::Conversion { parameter, type_name, .. } => {
                assert_eq!(parameter, "n");
                assert_eq!(type_name, "int");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_optional_does_not_consume_on_failure() {
        let (args, _) = resolve(
            vec![ParamDecl::optional("n", "int"), ParamDecl::required("word", "str")],
            true,
            "hello",
        );
        let args = args.unwrap();
        assert!(!args.is_set("n"));
        assert_eq!(args.get_str("word"), Some("hello"));
    }

    #[test]
    fn test_optional_at_eof() {
        let (args, _) = resolve(vec![ParamDecl::optional("n", "int")], false, "");
        assert_eq!(args.unwrap().get("n"), Some(&ArgValue::None));
    }

    #[test]
    fn test_optional_swallows_quote_errors() {
        let (args, view) = resolve(vec![ParamDecl::optional("s", "str")], true, r#""open"#);
        assert!(!args.unwrap().is_set("s"));
        assert_eq!(view.position(), 0);
    }

    #[test]
    fn test_union_first_match_wins() {
        let decl = || vec![ParamDecl::one_of("v", ["int", "str"])];
        let (args, _) = resolve(decl(), true, "42");
        assert_eq!(args.unwrap().get("v"), Some(&ArgValue::Int(42)));
        let (args, _) = resolve(decl(), true, "abc");
        assert_eq!(args.unwrap().get("v"), Some(&ArgValue::from("abc")));
    }

    #[test]
    fn test_union_all_fail() {
        let (err, view) = resolve(vec![ParamDecl::one_of("v", ["int", "bool"])], true, "abc rest");
        match err.unwrap_err() {
            CommandError::BadUnionArgument { parameter, types, argument } => {
                assert_eq!(parameter, "v");
                assert_eq!(types, ["int", "bool"]);
                assert_eq!(argument, "abc");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(view.position(), 0);
    }

    #[test]
    fn test_too_many_arguments() {
        let (err, _) = resolve(vec![ParamDecl::required("a", "str")], false, "one two");
        assert!(matches!(err.unwrap_err(), CommandError::TooManyArguments { .. }));

        let (ok, _) = resolve(vec![ParamDecl::required("a", "str")], false, "one   ");
        assert!(ok.is_ok());

        let (ok, _) = resolve(vec![ParamDecl::required("a", "str")], true, "one two");
        assert!(ok.is_ok());
    }

    #[test]
    fn test_quote_error_propagates_from_required() {
        let (err, _) = resolve(vec![ParamDecl::required("a", "str")], true, r#"ab"c"#);
        assert!(err.unwrap_err().is_quote_error());
    }

    #[test]
    fn test_bind_rejects_bad_declarations() {
        let registry = ConverterRegistry::with_builtins();
        let err = bind_parameters(
            "x",
            vec![ParamDecl::rest("a", "str"), ParamDecl::required("b", "int")],
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::RestOfInputNotLast { .. }));

        let err = bind_parameters("x", vec![ParamDecl::required("a", "nope")], &registry).unwrap_err();
        assert!(matches!(err, RegistrationError::UnknownConverter { ref type_name, .. } if type_name == "nope"));

        let err = bind_parameters(
            "x",
            vec![ParamDecl::required("a", "str"), ParamDecl::optional("a", "int")],
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateParameter { .. }));

        let err = bind_parameters("x", vec![ParamDecl::one_of("a", Vec::<String>::new())], &registry)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::EmptyUnion { .. }));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let decls = || {
            vec![
                ParamDecl::required("n", "int"),
                ParamDecl::one_of("flag", ["bool", "str"]),
                ParamDecl::optional("extra", "float"),
                ParamDecl::rest("msg", "str"),
            ]
        };
        let text = r#"7 "on second thought" 2.5 and the rest"#;
        let (first, _) = resolve(decls(), true, text);
        let (second, _) = resolve(decls(), true, text);
        let first = first.unwrap();
        assert_eq!(first, second.unwrap());
        assert_eq!(first.get_str("flag"), Some("on second thought"));
        assert_eq!(first.get_str("msg"), Some("and the rest"));
    }

    #[test]
    fn test_usage() {
        let params = bind(vec![
            ParamDecl::required("a", "int"),
            ParamDecl::optional("b", "int"),
            ParamDecl::rest("c", "str"),
        ]);
        let usage: Vec<_> = params.iter().map(Parameter::usage).collect();
        assert_eq!(usage, ["<a>", "[b]", "<c...>"]);
    }
}
