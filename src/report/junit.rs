use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::models::{TestCase, TestFailure, TestSuite};

/// Which element's text is currently being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Failure,
    SystemOut,
    SystemErr,
}

#[derive(Debug)]
struct ReportParser {
    suites: Vec<TestSuite>,
    open_suites: Vec<TestSuite>,
    case: Option<TestCase>,
    failure: Option<TestFailure>,
    capture: Capture,
    text: String,
}

/// Parse one JUnit XML document. Accepts a `<testsuite>` root or a
/// `<testsuites>` wrapper; failure bodies are kept verbatim.
pub fn parse_report(xml: &str) -> Result<Vec<TestSuite>> {
    let mut reader = Reader::from_str(xml);
    reader.check_end_names(true);
    let mut parser = ReportParser {
        suites: Vec::new(),
        open_suites: Vec::new(),
        case: None,
        failure: None,
        capture: Capture::None,
        text: String::new(),
    };

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("invalid XML at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => parser.start(&e)?,
            Event::Empty(e) => {
                parser.start(&e)?;
                parser.end(e.local_name().as_ref())?;
            }
            Event::End(e) => parser.end(e.local_name().as_ref())?,
            Event::Text(t) => {
                if parser.capture != Capture::None {
                    parser.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if parser.capture != Capture::None {
                    parser.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !parser.open_suites.is_empty() {
        bail!("unexpected end of document inside <testsuite>");
    }
    if parser.suites.is_empty() {
        bail!("no <testsuite> element found");
    }
    Ok(parser.suites)
}

impl ReportParser {
    fn start(&mut self, e: &BytesStart) -> Result<()> {
        match e.local_name().as_ref() {
            b"testsuite" => {
                let attrs = attributes(e)?;
                let mut suite = TestSuite::new(attrs.get("name").cloned().unwrap_or_default());
                suite.time_seconds = attrs.get("time").and_then(|t| parse_time(t));
                self.open_suites.push(suite);
            }
            b"testcase" => {
                if self.open_suites.is_empty() {
                    bail!("<testcase> outside of <testsuite>");
                }
                let attrs = attributes(e)?;
                let mut case = TestCase::new(attrs.get("name").cloned().unwrap_or_default());
                case.class_name = attrs.get("classname").cloned();
                case.time_seconds = attrs.get("time").and_then(|t| parse_time(t)).unwrap_or(0.0);
                self.case = Some(case);
            }
            b"failure" | b"error" => {
                let attrs = attributes(e)?;
                self.failure = Some(TestFailure {
                    kind: attrs.get("type").cloned(),
                    message: attrs.get("message").cloned().unwrap_or_default(),
                    contents: None,
                });
                self.begin_capture(Capture::Failure);
            }
            b"skipped" => {
                if let Some(case) = self.case.as_mut() {
                    case.skipped = true;
                }
            }
            b"system-out" => self.begin_capture(Capture::SystemOut),
            b"system-err" => self.begin_capture(Capture::SystemErr),
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) -> Result<()> {
        match name {
            b"testsuite" => {
                let suite = self
                    .open_suites
                    .pop()
                    .context("unbalanced </testsuite>")?;
                self.suites.push(suite);
            }
            b"testcase" => {
                if let Some(case) = self.case.take()
                    && let Some(suite) = self.open_suites.last_mut()
                {
                    suite.test_cases.push(case);
                }
            }
            b"failure" | b"error" => {
                let text = self.finish_capture();
                if let Some(mut failure) = self.failure.take() {
                    if !text.is_empty() {
                        if failure.message.is_empty() {
                            failure.message = text.lines().next().unwrap_or_default().to_string();
                        }
                        failure.contents = Some(text);
                    }
                    match self.case.as_mut() {
                        Some(case) => case.failures.push(failure),
                        None => log::debug!("ignoring failure outside of a test case"),
                    }
                }
            }
            b"system-out" => {
                let text = self.finish_capture();
                if let Some(suite) = self.open_suites.last_mut() {
                    append_output(&mut suite.system_out, text);
                }
            }
            b"system-err" => {
                let text = self.finish_capture();
                if let Some(suite) = self.open_suites.last_mut() {
                    append_output(&mut suite.system_err, text);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn begin_capture(&mut self, capture: Capture) {
        self.capture = capture;
        self.text.clear();
    }

    fn finish_capture(&mut self) -> String {
        self.capture = Capture::None;
        std::mem::take(&mut self.text)
    }
}

fn attributes(e: &BytesStart) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

/// Reports sometimes group thousands (`1,234.5`).
fn parse_time(value: &str) -> Option<f64> {
    value.replace(',', "").trim().parse().ok()
}

fn append_output(field: &mut Option<String>, text: String) {
    if text.trim().is_empty() {
        return;
    }
    match field {
        Some(existing) => existing.push_str(&text),
        None => *field = Some(text),
    }
}
