//! Shared test helpers: a scripted in-memory driver and a live connection
//! for ignored tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::env;
use std::rc::Rc;

use sqlpp_postgres::{
    ConnStatus, Connection, Driver, Error, ErrorFields, Oid, Opts, Response, Result,
};

/// A request received by [`ScriptedDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exec(String),
    Prepare { name: String, sql: String },
    ExecPrepared { name: String, params: Vec<Option<String>> },
    Finish,
}

/// Requests seen and responses to give, shared between a test and its driver.
#[derive(Default)]
pub struct Script {
    pub calls: Vec<Call>,
    pub responses: VecDeque<Result<Response>>,
    pub broken: bool,
    pub standard_conforming_strings: Option<&'static str>,
}

impl Script {
    /// Queue the outcome of the next driver call.
    pub fn push(&mut self, response: Result<Response>) {
        self.responses.push_back(response);
    }

    /// Queue the outcome of a statement run through the unnamed prepared
    /// statement: a successful parse, then `response`.
    pub fn push_statement(&mut self, response: Result<Response>) {
        self.push(Ok(Response::command("")));
        self.push(response);
    }

    pub fn executed(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Exec(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn last_params(&self) -> Option<&[Option<String>]> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::ExecPrepared { params, .. } => Some(params.as_slice()),
            _ => None,
        })
    }

    fn next(&mut self) -> Result<Response> {
        if self.broken {
            return Err(Error::BrokenConnection("connection reset by peer".into()));
        }
        self.responses
            .pop_front()
            .unwrap_or_else(|| Ok(Response::command("")))
    }
}

/// Driver answering from a [`Script`]. Unscripted calls succeed with an
/// empty command response.
pub struct ScriptedDriver {
    script: Rc<RefCell<Script>>,
}

impl Driver for ScriptedDriver {
    fn status(&self) -> ConnStatus {
        if self.script.borrow().broken {
            ConnStatus::Bad
        } else {
            ConnStatus::Ok
        }
    }

    fn exec(&mut self, sql: &str) -> Result<Response> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Call::Exec(sql.to_string()));
        script.next()
    }

    fn prepare(&mut self, name: &str, sql: &str, _param_types: &[Oid]) -> Result<Response> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Call::Prepare {
            name: name.to_string(),
            sql: sql.to_string(),
        });
        script.next()
    }

    fn exec_prepared(&mut self, name: &str, params: &[Option<&str>]) -> Result<Response> {
        let mut script = self.script.borrow_mut();
        script.calls.push(Call::ExecPrepared {
            name: name.to_string(),
            params: params.iter().map(|p| p.map(str::to_string)).collect(),
        });
        script.next()
    }

    fn parameter_status(&self, name: &str) -> Option<&str> {
        match name {
            "standard_conforming_strings" => self.script.borrow().standard_conforming_strings,
            _ => None,
        }
    }

    fn finish(&mut self) {
        self.script.borrow_mut().calls.push(Call::Finish);
    }
}

/// A connection backed by a [`ScriptedDriver`].
pub fn scripted() -> (Connection, Rc<RefCell<Script>>) {
    scripted_with(Opts::default())
}

pub fn scripted_with(opts: Opts) -> (Connection, Rc<RefCell<Script>>) {
    let script = Rc::new(RefCell::new(Script {
        standard_conforming_strings: Some("on"),
        ..Default::default()
    }));
    let driver = ScriptedDriver {
        script: Rc::clone(&script),
    };
    (Connection::with_driver(Box::new(driver), opts), script)
}

/// Failed statement response with the given SQLSTATE.
pub fn server_error(code: &str, message: &str) -> Response {
    Response::fatal(ErrorFields {
        severity: Some("ERROR".into()),
        code: Some(code.into()),
        message: Some(message.into()),
        ..Default::default()
    })
}

/// Connection to the server named by `DATABASE_URL`.
pub fn get_conn() -> Connection {
    let mut db_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/postgres".to_string());
    if !db_url.contains("sslmode=") {
        if db_url.contains('?') {
            db_url.push_str("&sslmode=disable");
        } else {
            db_url.push_str("?sslmode=disable");
        }
    }
    let opts = Opts::try_from(db_url.as_str()).expect("Invalid DATABASE_URL");
    Connection::new(opts).expect("Failed to connect")
}
