use xsltc_bytecode::{ClassGen, Constant, ForeignType, MethodGen};
use xsltc_compiler::{
    compile_str, CompileOutput, CompilerOptions, ErrorCode, ExtensionRegistry, ForeignClass,
    Severity,
};

const XSL: &str = r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#;

/// Compile a stylesheet whose declarations start on line 2, one per
/// line of `lines`.
fn compile_lines(lines: &[&str]) -> CompileOutput {
    compile_with(lines, CompilerOptions::new().translet_name("T"))
}

fn compile_with(lines: &[&str], options: CompilerOptions) -> CompileOutput {
    let text = format!(
        "<xsl:stylesheet version=\"1.0\" {}>\n{}\n</xsl:stylesheet>",
        XSL,
        lines.join("\n")
    );
    compile_str(&text, &options)
}

fn lines_of(class: &ClassGen) -> Vec<u32> {
    let mut lines = class
        .methods
        .iter()
        .flat_map(|method| method.lines.iter().copied())
        .filter(|line| *line != 0)
        .collect::<Vec<_>>();
    lines.sort_unstable();
    lines.dedup();
    lines
}

fn dispatch(output: &CompileOutput) -> &MethodGen {
    output.units()[0].method("applyTemplates").unwrap()
}

#[test]
fn test_shadowed_template_produces_no_code() {
    let output = compile_lines(&[
        r#"<xsl:template match="elem">first</xsl:template>"#,
        r#"<xsl:template match="elem">second</xsl:template>"#,
    ]);
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    assert_eq!(lines_of(&output.units()[0]), vec![3]);
}

#[test]
fn test_templates_after_unconditional_pattern_are_dead() {
    let output = compile_lines(&[
        r#"<xsl:template match="a[@x]">conditional</xsl:template>"#,
        r#"<xsl:template match="a">plain</xsl:template>"#,
        r#"<xsl:template match="a" priority="-1">unreachable</xsl:template>"#,
    ]);
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    assert_eq!(lines_of(&output.units()[0]), vec![2, 3]);
}

#[test]
fn test_explicit_priority_keeps_both_templates() {
    let output = compile_lines(&[
        r#"<xsl:template match="*">any</xsl:template>"#,
        r#"<xsl:template match="elem" priority="5">elem</xsl:template>"#,
    ]);
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    assert_eq!(lines_of(&output.units()[0]), vec![2, 3]);
}

#[test]
fn test_overload_choice_ignores_declaration_order() {
    for class in [
        ForeignClass::new("Calc")
            .with_static_method("f", vec![ForeignType::Double], ForeignType::Double)
            .with_static_method("f", vec![ForeignType::Int], ForeignType::Double),
        ForeignClass::new("Calc")
            .with_static_method("f", vec![ForeignType::Int], ForeignType::Double)
            .with_static_method("f", vec![ForeignType::Double], ForeignType::Double),
    ] {
        let output = compile_with(
            &[r#"<xsl:template match="/" xmlns:c="java:Calc"><xsl:value-of select="c:f(1.5)"/></xsl:template>"#],
            CompilerOptions::new().extensions(ExtensionRegistry::new().with_class(class)),
        );
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        let bound = dispatch(&output)
            .constants
            .iter()
            .filter_map(|constant| match constant {
                Constant::Foreign(method) => Some(method.params.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(bound, vec![vec![ForeignType::Double]]);
    }
}

#[test]
fn test_sort_helper_captures_each_variable_once() {
    let output = compile_lines(&[
        r#"<xsl:template match="/">"#,
        r#"<xsl:variable name="x" select="2"/>"#,
        r#"<xsl:variable name="y" select="3"/>"#,
        r#"<xsl:for-each select="*"><xsl:sort select="$x * $y + $x" data-type="number"/></xsl:for-each>"#,
        r#"</xsl:template>"#,
    ]);
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    let units = output.units();
    assert_eq!(units.len(), 2);
    let helper = &units[1];
    assert_eq!(helper.name, "T$1");
    assert_eq!(helper.superclass.as_deref(), Some("NodeSortRecord"));
    assert_eq!(
        helper
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>(),
        vec!["translet", "x", "y"]
    );
    assert!(helper.method("extractValue").is_some());
}

#[test]
fn test_circular_globals_report_one_error() {
    let output = compile_lines(&[
        r#"<xsl:variable name="a" select="$b"/>"#,
        r#"<xsl:variable name="b" select="$a"/>"#,
    ]);
    assert_eq!(output.errors.len(), 1);
    assert_eq!(output.errors[0].code, ErrorCode::CircularVariable);
    assert_eq!(output.errors[0].severity, Severity::Error);
    assert!(output.units().is_empty());
}

#[test]
fn test_errors_do_not_stop_checking() {
    let output = compile_lines(&[
        r#"<xsl:template match="/"><xsl:value-of select="nope()"/><xsl:value-of select="$missing"/></xsl:template>"#,
    ]);
    assert!(output.errors.len() >= 2, "{:?}", output.errors);
    assert!(output.units().is_empty());
}

#[test]
fn test_helper_names_use_the_translet_name() {
    let output = compile_with(
        &[r#"<xsl:template match="/"><xsl:number count="a|b" format="1"/></xsl:template>"#],
        CompilerOptions::new().translet_name("Counting"),
    );
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    let names = output
        .units()
        .iter()
        .map(|class| class.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Counting", "Counting$1"]);
    assert!(output.units()[1].method("matchesCount").is_some());
    assert!(output.units()[1].method("matchesFrom").is_none());
}
