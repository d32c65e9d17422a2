use xsltc::bytecode::{disassemble, ForeignType};
use xsltc::compiler::{
    CompilerOptions, ErrorCode, ExtensionRegistry, ForeignClass, MemoryResolver,
};
use xsltc::runtime::{self, FunctionBindings, TransformOptions, Value};
use xsltc::{evaluate, Error, Transformer};

fn stylesheet(body: &str) -> String {
    format!(
        r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
        body
    )
}

#[test]
fn test_transform() {
    let output = evaluate(
        "<doc/>",
        &stylesheet(r#"<xsl:template match="/"><a/></xsl:template>"#),
    )
    .unwrap();
    assert_eq!(output, "<a/>");
}

#[test]
fn test_transform_nested_apply_templates() {
    let output = evaluate(
        "<doc><foo/><bar/></doc>",
        &stylesheet(
            r#"
            <xsl:template match="/">
              <o><xsl:apply-templates select="doc/*"/></o>
            </xsl:template>
            <xsl:template match="foo">
              <f/>
            </xsl:template>
            <xsl:template match="bar">
              <b/>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "<o><f/><b/></o>");
}

#[test]
fn test_built_in_rules() {
    // text is copied, elements recurse, attributes are not visited
    let output = evaluate(r#"<doc a="skipped"><p>hi</p> there</doc>"#, &stylesheet("")).unwrap();
    assert_eq!(output, "hi there");
}

#[test]
fn test_explicit_priority_beats_wildcard() {
    let output = evaluate(
        "<doc><item/></doc>",
        &stylesheet(
            r#"
            <xsl:template match="doc"><xsl:apply-templates/></xsl:template>
            <xsl:template match="item">name</xsl:template>
            <xsl:template match="*" priority="5">star</xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "star");
}

#[test]
fn test_wildcard_beats_negative_priority() {
    let output = evaluate(
        "<doc><item/></doc>",
        &stylesheet(
            r#"
            <xsl:template match="doc"><xsl:apply-templates/></xsl:template>
            <xsl:template match="item" priority="-5">name</xsl:template>
            <xsl:template match="*">star</xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "star");
}

#[test]
fn test_later_template_wins_a_tie() {
    let output = evaluate(
        "<a/>",
        &stylesheet(
            r#"
            <xsl:template match="a">first</xsl:template>
            <xsl:template match="a">second</xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "second");
}

#[test]
fn test_predicate_patterns_fall_through() {
    let output = evaluate(
        r#"<doc><a x="1"/><a/></doc>"#,
        &stylesheet(
            r#"
            <xsl:template match="a[@x]">[x]</xsl:template>
            <xsl:template match="a">[plain]</xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "[x][plain]");
}

#[test]
fn test_value_of_expressions() {
    let output = evaluate(
        "<doc><n>3</n><n>4</n></doc>",
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:value-of select="sum(doc/n) * 2"/>
              <xsl:text>|</xsl:text>
              <xsl:value-of select="concat(substring('abcdef', 2, 3), '-', string-length('xyz'))"/>
              <xsl:text>|</xsl:text>
              <xsl:value-of select="count(doc/n[. &gt; 3])"/>
              <xsl:text>|</xsl:text>
              <xsl:value-of select="1 div 0"/>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "14|bcd-3|1|Infinity");
}

#[test]
fn test_and_or_short_circuit() {
    // evaluating the unbound call would fail the transformation
    let extensions = ExtensionRegistry::new().with_class(
        ForeignClass::new("Boom").with_static_method("fail", vec![], ForeignType::Boolean),
    );
    let transformer = Transformer::with_options(
        &stylesheet(
            r#"<xsl:template match="/" xmlns:b="java:Boom">
              <xsl:if test="false() and b:fail()">wrong</xsl:if>
              <xsl:if test="true() or b:fail()">right</xsl:if>
            </xsl:template>"#,
        ),
        &CompilerOptions::new().extensions(extensions),
    )
    .unwrap();
    assert_eq!(transformer.transform("<doc/>").unwrap(), "right");
}

#[test]
fn test_choose_and_variables() {
    let output = evaluate(
        "<doc><v>7</v></doc>",
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:variable name="v" select="number(doc/v)"/>
              <xsl:choose>
                <xsl:when test="$v &lt; 5">small</xsl:when>
                <xsl:when test="$v &lt; 10">medium</xsl:when>
                <xsl:otherwise>large</xsl:otherwise>
              </xsl:choose>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "medium");
}

#[test]
fn test_for_each_numeric_sort() {
    let output = evaluate(
        r#"<doc><i n="3"/><i n="10"/><i n="2"/></doc>"#,
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:for-each select="doc/i">
                <xsl:sort select="@n" data-type="number"/>
                <xsl:value-of select="@n"/><xsl:text>,</xsl:text>
              </xsl:for-each>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "2,3,10,");
}

#[test]
fn test_sort_key_uses_variable() {
    let output = evaluate(
        r#"<doc><i n="3"/><i n="10"/><i n="2"/></doc>"#,
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:variable name="k" select="-1"/>
              <xsl:for-each select="doc/i">
                <xsl:sort select="@n * $k * 2" data-type="number"/>
                <xsl:value-of select="@n"/><xsl:text>,</xsl:text>
              </xsl:for-each>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "10,3,2,");
}

#[test]
fn test_sort_key_reads_current_loop_variable() {
    let output = evaluate(
        r#"<doc><g f="1"><i n="1"/><i n="2"/></g><g f="-1"><i n="1"/><i n="2"/></g></doc>"#,
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:for-each select="doc/g">
                <xsl:variable name="k" select="number(@f)"/>
                <xsl:for-each select="i">
                  <xsl:sort select="$k * 2 * @n" data-type="number"/>
                  <xsl:value-of select="@n"/>
                </xsl:for-each>
                <xsl:text>|</xsl:text>
              </xsl:for-each>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "12|21|");
}

#[test]
fn test_apply_templates_text_sort_descending() {
    let output = evaluate(
        "<doc><w>pear</w><w>apple</w><w>fig</w></doc>",
        &stylesheet(
            r#"
            <xsl:template match="doc">
              <xsl:apply-templates select="w"><xsl:sort order="descending"/></xsl:apply-templates>
            </xsl:template>
            <xsl:template match="w"><xsl:value-of select="."/>;</xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "pear;fig;apple;");
}

#[test]
fn test_number_formats() {
    let output = evaluate(
        "<doc><i/><i/><i/></doc>",
        &stylesheet(
            r#"
            <xsl:template match="i"><xsl:number format="(a)"/></xsl:template>
            <xsl:template match="/">
              <xsl:apply-templates select="doc/i"/>
              <xsl:number value="1999" format="I"/>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "(a)(b)(c)MCMXCIX");
}

#[test]
fn test_number_multiple_levels() {
    let output = evaluate(
        "<doc><s><t/><t/></s><s><t/></s></doc>",
        &stylesheet(
            r#"
            <xsl:template match="t"><xsl:number level="multiple" count="s|t" format="1.1"/>;</xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "1.1;1.2;2.1;");
}

#[test]
fn test_keys() {
    let output = evaluate(
        r#"<doc><item cat="a" id="1"/><item cat="b" id="2"/><item cat="a" id="3"/></doc>"#,
        &stylesheet(
            r#"
            <xsl:key name="by-cat" match="item" use="@cat"/>
            <xsl:template match="/">
              <xsl:value-of select="count(key('by-cat', 'a'))"/>
              <xsl:text>:</xsl:text>
              <xsl:for-each select="key('by-cat', 'a')"><xsl:value-of select="@id"/></xsl:for-each>
              <xsl:text>:</xsl:text>
              <xsl:value-of select="key('by-cat', 'b')/@id"/>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "2:13:2");
}

#[test]
fn test_key_pattern() {
    let output = evaluate(
        r#"<doc><item cat="a">x</item><item cat="b">y</item></doc>"#,
        &stylesheet(
            r#"
            <xsl:key name="by-cat" match="item" use="@cat"/>
            <xsl:template match="key('by-cat', 'b')">[<xsl:value-of select="."/>]</xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "x[y]");
}

#[test]
fn test_global_param() {
    let transformer = Transformer::new(&stylesheet(
        r#"
        <xsl:param name="who" select="'world'"/>
        <xsl:template match="/">hello <xsl:value-of select="$who"/></xsl:template>"#,
    ))
    .unwrap();
    assert_eq!(transformer.transform("<doc/>").unwrap(), "hello world");
    let options = TransformOptions::new().param("who", "you");
    assert_eq!(
        transformer.transform_with("<doc/>", &options).unwrap(),
        "hello you"
    );
}

#[test]
fn test_template_params() {
    let output = evaluate(
        "<doc/>",
        &stylesheet(
            r#"
            <xsl:template name="greet">
              <xsl:param name="name" select="'nobody'"/>
              <xsl:param name="punctuation">!</xsl:param>
              <xsl:value-of select="concat('hi ', $name, $punctuation)"/>
            </xsl:template>
            <xsl:template match="/">
              <xsl:call-template name="greet">
                <xsl:with-param name="name" select="'bob'"/>
              </xsl:call-template>
              <xsl:text> </xsl:text>
              <xsl:call-template name="greet"/>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "hi bob! hi nobody!");
}

#[test]
fn test_apply_templates_with_param() {
    let output = evaluate(
        "<doc><a/><a/></doc>",
        &stylesheet(
            r#"
            <xsl:template match="doc">
              <xsl:apply-templates select="a"><xsl:with-param name="p" select="'x'"/></xsl:apply-templates>
            </xsl:template>
            <xsl:template match="a"><xsl:param name="p" select="'default'"/><xsl:value-of select="$p"/></xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "xx");
}

#[test]
fn test_apply_imports() {
    let resolver = MemoryResolver::new().with(
        "base.xsl",
        &stylesheet(r#"<xsl:template match="a"><base><xsl:value-of select="."/></base></xsl:template>"#),
    );
    let transformer = Transformer::with_options(
        &stylesheet(
            r#"
            <xsl:import href="base.xsl"/>
            <xsl:template match="a"><main><xsl:apply-imports/></main></xsl:template>"#,
        ),
        &CompilerOptions::new().resolver(resolver),
    )
    .unwrap();
    assert_eq!(
        transformer.transform("<a>x</a>").unwrap(),
        "<main><base>x</base></main>"
    );
}

#[test]
fn test_identity_transform() {
    let output = evaluate(
        r#"<a x="1"><b>t</b><!--c--><?pi data?></a>"#,
        &stylesheet(
            r#"
            <xsl:template match="@*|node()">
              <xsl:copy><xsl:apply-templates select="@*|node()"/></xsl:copy>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, r#"<a x="1"><b>t</b><!--c--><?pi data?></a>"#);
}

#[test]
fn test_copy_of_result_tree_fragment() {
    let output = evaluate(
        "<doc><p>one</p></doc>",
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:variable name="fragment"><x><xsl:value-of select="doc/p"/></x></xsl:variable>
              <out><xsl:copy-of select="$fragment"/><xsl:copy-of select="doc/p"/></out>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "<out><x>one</x><p>one</p></out>");
}

#[test]
fn test_constructed_nodes() {
    let output = evaluate(
        "<doc><kind>item</kind></doc>",
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:element name="{doc/kind}">
                <xsl:attribute name="n">1</xsl:attribute>
                <xsl:comment>note</xsl:comment>
                <xsl:processing-instruction name="go">now</xsl:processing-instruction>
              </xsl:element>
            </xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, r#"<item n="1"><!--note--><?go now?></item>"#);
}

#[test]
fn test_literal_attribute_value_templates() {
    let output = evaluate(
        r#"<doc href="x.html">link</doc>"#,
        &stylesheet(
            r#"<xsl:template match="doc"><a href="{@href}" title="{.} &amp; more"/></xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, r#"<a href="x.html" title="link &amp; more"/>"#);
}

#[test]
fn test_html_output_method() {
    let output = evaluate(
        "<doc/>",
        &stylesheet(r#"<xsl:template match="/"><html><body>a<br/>b</body></html></xsl:template>"#),
    )
    .unwrap();
    assert_eq!(output, "<html><body>a<br>b</body></html>");
}

#[test]
fn test_indented_output() {
    let output = evaluate(
        "<doc/>",
        &stylesheet(
            r#"
            <xsl:output method="xml" indent="yes"/>
            <xsl:template match="/"><a><b/><c>text</c></a></xsl:template>"#,
        ),
    )
    .unwrap();
    insta::assert_snapshot!(output, @r###"
    <a>
      <b/>
      <c>text</c>
    </a>
    "###);
}

#[test]
fn test_xml_declaration() {
    let output = evaluate(
        "<doc/>",
        &stylesheet(
            r#"
            <xsl:output omit-xml-declaration="no"/>
            <xsl:template match="/"><a/></xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, r#"<?xml version="1.0" encoding="UTF-8"?><a/>"#);
}

#[test]
fn test_message_terminates() {
    let error = evaluate(
        "<doc/>",
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:message>carry on</xsl:message>
              <xsl:message terminate="yes">stop <xsl:value-of select="name(*)"/></xsl:message>
            </xsl:template>"#,
        ),
    )
    .unwrap_err();
    match error {
        Error::Runtime(spanned) => {
            assert_eq!(spanned.error, runtime::Error::Terminated("stop doc".to_string()));
            assert!(spanned.method.is_some());
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn test_unknown_element_is_an_error_in_version_1() {
    let error = evaluate(
        "<doc/>",
        &stylesheet(r#"<xsl:template match="/"><xsl:frobnicate/>ok</xsl:template>"#),
    )
    .unwrap_err();
    let Error::Compile(diagnostics) = error else {
        panic!("expected compile errors");
    };
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, ErrorCode::UnknownElement);
}

#[test]
fn test_unknown_element_is_ignored_forwards_compatibly() {
    let transformer = Transformer::new(
        r#"<xsl:stylesheet version="2.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
             <xsl:template match="/"><xsl:frobnicate/>ok</xsl:template>
           </xsl:stylesheet>"#,
    )
    .unwrap();
    assert_eq!(transformer.warnings().len(), 1);
    assert_eq!(transformer.warnings()[0].code, ErrorCode::IgnoredElement);
    assert_eq!(transformer.transform("<doc/>").unwrap(), "ok");
}

#[test]
fn test_dispatch_walks_its_iterator_once() {
    let transformer = Transformer::new(&stylesheet(
        r#"<xsl:template match="a">A</xsl:template>"#,
    ))
    .unwrap();
    let main = &transformer.translet().classes[0];
    let dispatch = main.method("applyTemplates").unwrap();
    let text = disassemble(dispatch);
    assert_eq!(text.matches("IterNext").count(), 1);
    assert_eq!(text.matches("Switch").count(), 1);
}

#[test]
fn test_namespace_wildcard_dispatch() {
    let output = evaluate(
        r#"<doc xmlns:x="urn:x"><x:a/><b/><x:c/></doc>"#,
        &stylesheet(
            r#"
            <xsl:template match="doc"><xsl:apply-templates/></xsl:template>
            <xsl:template match="x:*" xmlns:x="urn:x">X</xsl:template>
            <xsl:template match="*">E</xsl:template>"#,
        ),
    )
    .unwrap();
    assert_eq!(output, "XEX");
}

#[test]
fn test_foreign_function() {
    let extensions = ExtensionRegistry::new().with_class(
        ForeignClass::new("Calc").with_static_method(
            "twice",
            vec![ForeignType::Double],
            ForeignType::Double,
        ),
    );
    let transformer = Transformer::with_options(
        &stylesheet(
            r#"<xsl:template match="/" xmlns:c="java:Calc"><xsl:value-of select="c:twice(21)"/></xsl:template>"#,
        ),
        &CompilerOptions::new().extensions(extensions),
    )
    .unwrap();
    let bindings = FunctionBindings::new().with_function("Calc", "twice", |dom, _, arguments| {
        Ok(Value::Number(arguments[0].to_number(dom) * 2.0))
    });
    let options = TransformOptions::new().bindings(bindings);
    assert_eq!(transformer.transform_with("<doc/>", &options).unwrap(), "42");

    let error = transformer.transform("<doc/>").unwrap_err();
    assert!(matches!(
        error,
        Error::Runtime(spanned) if matches!(spanned.error, runtime::Error::Foreign { .. })
    ));
}

#[test]
fn test_result_tree_fragment_is_not_a_node_set() {
    let error = evaluate(
        "<doc/>",
        &stylesheet(
            r#"<xsl:template match="/">
              <xsl:variable name="f"><x/></xsl:variable>
              <xsl:for-each select="$f"><xsl:value-of select="."/></xsl:for-each>
            </xsl:template>"#,
        ),
    );
    assert!(error.is_err());
}
