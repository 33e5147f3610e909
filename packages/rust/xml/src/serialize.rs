//! UTF-8 serialization with resolved characters written literally.

use crate::document::{Element, Misc, Node, XmlDocument};

/// Declaration written at the top of every output file.
pub const XML_DECLARATION: &str = "<?xml version='1.0' encoding='UTF-8'?>";

impl XmlDocument {
    /// Serialize the document.
    ///
    /// Only markup-significant characters are escaped; everything the parser
    /// resolved (`&#163;` and friends) is written as the character itself.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str(XML_DECLARATION);
        out.push('\n');

        if let Some(doctype) = &self.doctype {
            out.push_str("<!DOCTYPE ");
            out.push_str(doctype);
            out.push_str(">\n");
        }
        for misc in &self.prolog {
            write_misc(&mut out, misc);
            out.push('\n');
        }

        write_element(&mut out, &self.root);

        for misc in &self.epilog {
            out.push('\n');
            write_misc(&mut out, misc);
        }
        out
    }
}

fn write_misc(out: &mut String, misc: &Misc) {
    match misc {
        Misc::Comment(body) => write_comment(out, body),
        Misc::ProcessingInstruction(body) => write_pi(out, body),
    }
}

fn write_comment(out: &mut String, body: &str) {
    out.push_str("<!--");
    out.push_str(body);
    out.push_str("-->");
}

fn write_pi(out: &mut String, body: &str) {
    out.push_str("<?");
    out.push_str(body);
    out.push_str("?>");
}

fn write_element(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attribute(out, value);
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(inner) => write_element(out, inner),
            Node::Text(text) => escape_text(out, text),
            Node::Comment(body) => write_comment(out, body),
            Node::ProcessingInstruction(body) => write_pi(out, body),
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(input: &str) -> String {
        XmlDocument::parse(input).unwrap().to_xml_string()
    }

    #[test]
    fn writes_declaration_and_literal_characters() {
        let out = roundtrip("<a>&#163;5 &#xE9;t&#233;</a>");
        assert_eq!(out, "<?xml version='1.0' encoding='UTF-8'?>\n<a>£5 été</a>");
    }

    #[test]
    fn escapes_markup_characters_only() {
        let out =
            roundtrip("<a q='say \"hi\" &amp; &lt;go&gt;'>1 &lt; 2 &amp;&amp; 3 &gt; 2 \"'</a>");
        assert!(out.ends_with(
            "<a q=\"say &quot;hi&quot; &amp; &lt;go&gt;\">1 &lt; 2 &amp;&amp; 3 &gt; 2 \"'</a>"
        ));
    }

    #[test]
    fn childless_elements_self_close() {
        let out = roundtrip("<a><b></b><c x=\"1\"/></a>");
        assert!(out.ends_with("<a><b/><c x=\"1\"/></a>"));
    }

    #[test]
    fn keeps_doctype_comments_and_pis() {
        let out = roundtrip(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE a>\n<!-- c --><a><?keep me?><!--in--></a><!-- after -->",
        );
        assert_eq!(
            out,
            "<?xml version='1.0' encoding='UTF-8'?>\n<!DOCTYPE a>\n<!-- c -->\n<a><?keep me?><!--in--></a>\n<!-- after -->"
        );
    }

    #[test]
    fn reparses_to_the_same_tree() {
        let input = "<r:Content xml:lang=\"en-GB\" t=\"a&#10;b\">x &amp; y <i>z</i>\n</r:Content>";
        let doc = XmlDocument::parse(input).unwrap();
        let again = XmlDocument::parse(&doc.to_xml_string()).unwrap();
        assert_eq!(doc.root, again.root);
    }
}
