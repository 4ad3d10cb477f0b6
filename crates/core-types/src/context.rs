use crate::CallerId;

/// Everything the host knows about one incoming call.
///
/// `args` is the already-decoded argument variant; `arg_bytes` is the raw
/// payload it was decoded from. Deadline and resource budget are carried
/// through for custom rules and are not enforced by the engine.
#[derive(Clone, Debug)]
pub struct CallContext<V> {
    pub method: String,
    pub caller: CallerId,
    pub arg_bytes: Vec<u8>,
    pub is_read_only: bool,
    pub resource_budget: Option<u64>,
    pub deadline: Option<u64>,
    pub is_boundary_check: bool,
    pub args: V,
}

impl<V> CallContext<V> {
    /// Runtime ("guard") context with empty raw bytes.
    pub fn new(method: impl Into<String>, caller: CallerId, args: V) -> Self {
        Self {
            method: method.into(),
            caller,
            arg_bytes: Vec::new(),
            is_read_only: false,
            resource_budget: None,
            deadline: None,
            is_boundary_check: false,
            args,
        }
    }

    pub fn boundary(mut self) -> Self {
        self.is_boundary_check = true;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.is_read_only = read_only;
        self
    }

    pub fn with_arg_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.arg_bytes = bytes.into();
        self
    }

    pub fn with_resource_budget(mut self, budget: u64) -> Self {
        self.resource_budget = Some(budget);
        self
    }

    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Borrowed view of the untyped part of the context.
    pub fn info(&self) -> CallInfo<'_> {
        CallInfo {
            method: &self.method,
            caller: &self.caller,
            arg_bytes: &self.arg_bytes,
            is_read_only: self.is_read_only,
            resource_budget: self.resource_budget,
            deadline: self.deadline,
            is_boundary_check: self.is_boundary_check,
        }
    }
}

/// Call metadata without the typed arguments, handed to custom predicates.
#[derive(Clone, Copy, Debug)]
pub struct CallInfo<'a> {
    pub method: &'a str,
    pub caller: &'a CallerId,
    pub arg_bytes: &'a [u8],
    pub is_read_only: bool,
    pub resource_budget: Option<u64>,
    pub deadline: Option<u64>,
    pub is_boundary_check: bool,
}
