//! `gen_server` call envelopes

use bacgate_term::Term;

use crate::protocol::Reply;

/// An inbound `{'$gen_call', From, Request}`
#[derive(Debug, Clone, PartialEq)]
pub struct GenCall {
    /// Caller identity and correlation reference, echoed verbatim
    pub from: Term,
    pub request: Term,
}

impl GenCall {
    /// Recognize a call envelope; `None` for any other shape
    pub fn from_term(term: Term) -> Option<Self> {
        let Term::Tuple(mut elements) = term else {
            return None;
        };
        if elements.len() != 3 || !elements[0].is_atom("$gen_call") || !is_valid_from(&elements[1]) {
            return None;
        }
        let request = elements.pop()?;
        let from = elements.pop()?;
        Some(Self { from, request })
    }

    /// Reply envelope answering this call
    pub fn reply(&self, reply: Reply) -> Term {
        Term::tuple(vec![Term::atom("$gen_reply"), self.from.clone(), reply.to_term()])
    }
}

/// `{Pid, Ref}` or `{Pid, [alias | Ref]}`
fn is_valid_from(from: &Term) -> bool {
    let Some([pid, tag]) = from.as_tuple() else {
        return false;
    };
    if !matches!(pid, Term::Pid(_)) {
        return false;
    }
    match tag {
        Term::Reference(_) => true,
        Term::ImproperList(head, tail) => {
            matches!(head.as_slice(), [alias] if alias.is_atom("alias")) && matches!(**tail, Term::Reference(_))
        }
        _ => false,
    }
}
