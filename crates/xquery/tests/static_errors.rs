use rstest::rstest;
use xqdb_xquery::{ErrorCode, ErrorKind, StaticContextBuilder, compile};

#[rstest]
#[case("$undeclared", ErrorCode::XPST0008)]
#[case("(for $d in (1, 2) return $d, $d)", ErrorCode::XPST0008)]
#[case(".", ErrorCode::XPDY0002)]
#[case("count(.)", ErrorCode::XPDY0002)]
#[case("position()", ErrorCode::XPDY0002)]
#[case("for $d in collection('/db') return last()", ErrorCode::XPDY0002)]
#[case("foo()", ErrorCode::XPST0017)]
#[case("count()", ErrorCode::XPST0017)]
#[case("util:nope(1)", ErrorCode::XPST0017)]
#[case("collection($x)", ErrorCode::XQDB0001)]
#[case("doc(1)", ErrorCode::XQDB0001)]
#[case("for $x in", ErrorCode::XPST0003)]
#[case("collection('/db'", ErrorCode::XPST0003)]
fn rejected_at_compile_time(#[case] source: &str, #[case] code: ErrorCode) {
    let ctx = StaticContextBuilder::new().with_variable("x").build();
    let err = compile(source, &ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Static, "{source}: {err}");
    assert_eq!(err.code, code, "{source}: {err}");
    assert!(err.is_static());
}

#[rstest]
#[case("collection('/db')[position() = 1]")]
#[case("collection('/db')[exists(.)]")]
#[case("for $d in collection('/db') where . = $d return $d")]
#[case("collection(('/db/a'))")]
#[case("$x")]
fn accepted(#[case] source: &str) {
    let ctx = StaticContextBuilder::new().with_variable("x").build();
    compile(source, &ctx).unwrap();
}

#[rstest]
fn parse_errors_keep_their_position() {
    let err = compile("1,\n  ,", &StaticContextBuilder::new().build()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0003);
    assert!(err.message.contains("line 2"), "{}", err.message);
}
