//! EC2/AutoScaling XML response encoding (`spec.md` §6). Built on
//! `quick-xml`'s `Writer` for correct escaping; callers assemble the body
//! element-by-element (the shape of each action's payload varies too much
//! for one serde struct to cover without reintroducing the reflection the
//! source is criticized for in `spec.md` §9).

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

pub const EC2_XMLNS: &str = "http://ec2.amazonaws.com/doc/2016-11-15/";
pub const AUTOSCALING_XMLNS: &str = "http://autoscaling.amazonaws.com/doc/2011-01-01/";

pub struct XmlBuilder {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlBuilder {
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    pub fn open(&mut self, tag: &str) -> &mut Self {
        self.writer.write_event(Event::Start(BytesStart::new(tag))).expect("xml write");
        self
    }

    pub fn open_with_xmlns(&mut self, tag: &str, xmlns: &str) -> &mut Self {
        let mut start = BytesStart::new(tag);
        start.push_attribute(("xmlns", xmlns));
        self.writer.write_event(Event::Start(start)).expect("xml write");
        self
    }

    pub fn close(&mut self, tag: &str) -> &mut Self {
        self.writer.write_event(Event::End(BytesEnd::new(tag))).expect("xml write");
        self
    }

    pub fn text_elem(&mut self, tag: &str, value: impl std::fmt::Display) -> &mut Self {
        self.open(tag);
        let text = value.to_string();
        if !text.is_empty() {
            self.writer.write_event(Event::Text(BytesText::new(&text))).expect("xml write");
        }
        self.close(tag);
        self
    }

    pub fn text_elem_opt(&mut self, tag: &str, value: Option<impl std::fmt::Display>) -> &mut Self {
        if let Some(v) = value {
            self.text_elem(tag, v);
        }
        self
    }

    /// Splices in an already-rendered fragment (e.g. from a nested
    /// `XmlBuilder`) without re-escaping it.
    pub fn raw(&mut self, fragment: &str) -> &mut Self {
        self.writer.get_mut().get_mut().extend_from_slice(fragment.as_bytes());
        self
    }

    pub fn finish(self) -> String {
        String::from_utf8(self.writer.into_inner().into_inner()).expect("xml is valid utf8")
    }
}

impl Default for XmlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Dialect distinguishes where `<RequestId>`/`<RequestID>` is nested and
/// which xmlns applies (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Ec2,
    AutoScaling,
}

/// Wraps a pre-rendered response body in the action's root element, per
/// dialect.
pub fn render_response(dialect: Dialect, action: &str, request_id: &str, body: &str) -> String {
    let mut b = XmlBuilder::new();
    let root = format!("{action}Response");
    match dialect {
        Dialect::Ec2 => {
            b.open_with_xmlns(&root, EC2_XMLNS);
            b.raw(body);
            b.text_elem("requestId", request_id);
            b.close(&root);
        }
        Dialect::AutoScaling => {
            b.open_with_xmlns(&root, AUTOSCALING_XMLNS);
            b.raw(body);
            b.open("ResponseMetadata");
            b.text_elem("RequestId", request_id);
            b.close("ResponseMetadata");
            b.close(&root);
        }
    }
    b.finish()
}

/// Renders an error body, per dialect (`spec.md` §6/§7).
pub fn render_error(dialect: Dialect, code: &str, message: &str, request_id: &str) -> String {
    let mut b = XmlBuilder::new();
    match dialect {
        Dialect::Ec2 => {
            b.open("Response");
            b.open("Errors");
            b.open("Error");
            b.text_elem("Code", code);
            b.text_elem("Message", message);
            b.close("Error");
            b.close("Errors");
            b.text_elem("RequestID", request_id);
            b.close("Response");
        }
        Dialect::AutoScaling => {
            b.open("ErrorResponse");
            b.open("Error");
            b.text_elem("Code", code);
            b.text_elem("Message", message);
            b.close("Error");
            b.text_elem("RequestId", request_id);
            b.close("ErrorResponse");
        }
    }
    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ec2_response_nests_request_id_at_root() {
        let mut body = XmlBuilder::new();
        body.text_elem("instancesSet", "");
        let xml = render_response(Dialect::Ec2, "RunInstances", "req-1", &body.finish());
        assert!(xml.contains("<RunInstancesResponse xmlns=\"http://ec2.amazonaws.com/doc/2016-11-15/\">"));
        assert!(xml.contains("<requestId>req-1</requestId>"));
    }

    #[test]
    fn autoscaling_response_nests_request_id_under_metadata() {
        let xml = render_response(Dialect::AutoScaling, "DescribeAutoScalingGroups", "req-2", "");
        assert!(xml.contains("<ResponseMetadata>"));
        assert!(xml.contains("<RequestId>req-2</RequestId>"));
    }

    #[test]
    fn escapes_text_content() {
        let mut b = XmlBuilder::new();
        b.text_elem("Message", "a & b < c");
        assert!(b.finish().contains("a &amp; b &lt; c"));
    }
}
