use tracing::{debug, trace};

use crate::atom::{is_integer_literal, sym, AtomTable};
use crate::config::Limits;
use crate::env::FramePool;
use crate::error::{LispError, LispResult};
use crate::globals::install_globals;
use crate::heap::Heap;
use crate::primitives::{self, Primitive};
use crate::printer::print_val;
use crate::reader::{has_form_at, read_one_at};
use crate::value::{AtomId, FrameId, PairId, Value};

/// Store usage, as shown by the REPL's `:stats` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub durable_used: usize,
    pub durable_capacity: usize,
    pub atoms: usize,
    pub symbol_bytes: usize,
    pub symbol_capacity: usize,
    pub live_frames: usize,
    pub frame_capacity: usize,
    pub global_bindings: usize,
}

/// The evaluation machine.
/// All interpreter state lives here; two machines share nothing.
pub struct Machine {
    pub heap: Heap,
    pub atoms: AtomTable,
    pub frames: FramePool,
    limits: Limits,
    /// Current evaluation nesting.
    depth: usize,
    /// Environments of the evaluations in progress, innermost last.
    scopes: Vec<FrameId>,
    /// Procedures and arguments held by applications in progress.
    roots: Vec<Value>,
}

impl Machine {
    pub fn new(limits: Limits) -> LispResult<Self> {
        let mut heap = Heap::new(limits.transient_cells, limits.durable_cells);
        let mut atoms = AtomTable::new(limits.symbol_bytes);
        let mut frames = FramePool::new(
            limits.frame_pool,
            limits.frame_bindings,
            limits.global_bindings,
        );
        install_globals(&mut frames, &mut heap, &mut atoms)?;
        debug!(?limits, "machine ready");
        Ok(Machine {
            heap,
            atoms,
            frames,
            limits,
            depth: 0,
            scopes: Vec::new(),
            roots: Vec::new(),
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Discard every binding, pair and atom and start over.
    pub fn reset(&mut self) -> LispResult<()> {
        *self = Machine::new(self.limits)?;
        Ok(())
    }

    pub fn global(&self) -> FrameId {
        self.frames.global()
    }

    // ========================================================================
    // Reading and printing
    // ========================================================================

    /// Read the form starting at byte `pos` of `src`.
    ///
    /// When a form is present the transient arena is cleared first, so any
    /// parse tree from an earlier read is gone once this returns. At the end
    /// of input nothing is cleared and the last value read stays printable.
    pub fn read(&mut self, src: &str, pos: usize) -> LispResult<Option<(Value, usize)>> {
        if !has_form_at(src, pos) {
            return Ok(None);
        }
        self.heap.reset_transient();
        read_one_at(
            src,
            pos,
            &mut self.heap,
            &mut self.atoms,
            self.limits.max_read_depth,
        )
    }

    pub fn print(&self, val: Value) -> String {
        print_val(val, &self.heap, &self.atoms)
    }

    /// Read and evaluate every form in `src`, returning the last value
    /// (or `()` when there are none). Stops at the first error.
    pub fn run(&mut self, src: &str) -> LispResult<Value> {
        let mut pos = 0;
        let mut last = Value::Nil;
        while let Some((expr, next)) = self.read(src, pos)? {
            last = self.eval(expr)?;
            pos = next;
        }
        Ok(last)
    }

    /// `run`, then print the result.
    pub fn eval_str(&mut self, src: &str) -> LispResult<String> {
        let val = self.run(src)?;
        Ok(self.print(val))
    }

    pub fn stats(&self) -> Stats {
        let global = self.frames.global();
        Stats {
            durable_used: self.heap.durable_used(),
            durable_capacity: self.heap.durable_capacity(),
            atoms: self.atoms.count(),
            symbol_bytes: self.atoms.bytes_used(),
            symbol_capacity: self.atoms.capacity(),
            live_frames: self.frames.live_count(),
            frame_capacity: self.frames.capacity(),
            global_bindings: self.frames.bindings(global).map_or(0, |b| b.len()),
        }
    }

    /// Global bindings, newest last, printed as `(name, value)` text.
    pub fn global_bindings(&self) -> Vec<(String, String)> {
        let global = self.frames.global();
        self.frames
            .bindings(global)
            .map(|bindings| {
                bindings
                    .iter()
                    .map(|b| (self.atoms.text(b.name).to_string(), self.print(b.value)))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ========================================================================
    // Core evaluation entry point
    // ========================================================================

    /// Evaluate an expression in the global environment.
    pub fn eval(&mut self, expr: Value) -> LispResult<Value> {
        let global = self.frames.global();
        self.eval_in(expr, global)
    }

    /// Evaluate `expr` in `env`.
    pub fn eval_in(&mut self, expr: Value, env: FrameId) -> LispResult<Value> {
        if self.depth >= self.limits.max_depth {
            return Err(LispError::EvaluationAborted {
                limit: self.limits.max_depth,
            });
        }
        self.depth += 1;
        self.scopes.push(env);
        let result = self.eval_inner(expr, env);
        self.scopes.pop();
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: Value, env: FrameId) -> LispResult<Value> {
        match expr {
            Value::Nil | Value::Prim(_) | Value::Env(_) => Ok(expr),
            Value::Atom(id) => {
                if self.is_self_evaluating(id) {
                    Ok(expr)
                } else {
                    self.frames.lookup(id, env, &self.atoms)
                }
            }
            Value::Pair(id) => {
                if self.heap.is_closure(expr) {
                    return Ok(expr);
                }
                let head = self.heap.car(id);
                let rest = self.heap.cdr(id);
                if let Value::Atom(name) = head {
                    match self.special_form(name) {
                        Some(Form::Define) => return self.eval_define(rest, env),
                        Some(Form::Set) => return self.eval_set(rest, env),
                        Some(Form::Quote) => return self.eval_quote(rest),
                        Some(Form::If) => return self.eval_if(rest, env),
                        Some(Form::Lambda) => return self.eval_lambda(rest, env),
                        None => {}
                    }
                }
                let procedure = self.eval_in(head, env)?;
                self.apply(procedure, rest, env)
            }
        }
    }

    // Interning dedupes, so the well-known atoms compare by id.
    fn is_self_evaluating(&self, id: AtomId) -> bool {
        id == sym::TRUE || id == sym::FALSE || is_integer_literal(self.atoms.text(id))
    }

    fn special_form(&self, name: AtomId) -> Option<Form> {
        let forms = [
            (sym::DEFINE, Form::Define),
            (sym::SET, Form::Set),
            (sym::QUOTE, Form::Quote),
            (sym::IF, Form::If),
            (sym::LAMBDA, Form::Lambda),
        ];
        forms
            .into_iter()
            .find(|&(keyword, _)| name == keyword)
            .map(|(_, form)| form)
    }

    /// Operands of a special form as a Vec; an improper list is malformed.
    fn operands(&self, form: &str, rest: Value) -> LispResult<Vec<Value>> {
        self.heap
            .list_to_vec(rest)
            .ok_or_else(|| LispError::InvalidSpecialForm(format!("{}: improper operand list", form)))
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    /// (define name expr) or (define (name . params) body...)
    fn eval_define(&mut self, rest: Value, env: FrameId) -> LispResult<Value> {
        let operands = self.operands("define", rest)?;
        match operands.first().copied() {
            Some(Value::Atom(name)) => {
                if operands.len() != 2 || self.is_self_evaluating(name) {
                    return Err(LispError::InvalidSpecialForm(
                        "define: expected (define name expr)".into(),
                    ));
                }
                let value = self.eval_in(operands[1], env)?;
                self.frames.bind(env, name, value, &mut self.heap, &self.atoms)?;
                debug!(name = self.atoms.text(name), "define");
                Ok(Value::Atom(name))
            }
            Some(Value::Pair(sig)) => {
                let name = self
                    .heap
                    .car(sig)
                    .as_atom()
                    .filter(|&name| !self.is_self_evaluating(name))
                    .ok_or_else(|| {
                        LispError::InvalidSpecialForm("define: procedure name must be a symbol".into())
                    })?;
                if operands.len() < 2 {
                    return Err(LispError::InvalidSpecialForm(
                        "define: procedure has no body".into(),
                    ));
                }
                let params = self.heap.cdr(sig);
                let body = self.heap.cdr(rest.as_pair().ok_or_else(|| {
                    LispError::Internal("define: operands vanished".into())
                })?);
                let closure = self.make_closure(params, body, env)?;
                self.frames
                    .bind(env, name, closure, &mut self.heap, &self.atoms)?;
                debug!(name = self.atoms.text(name), "define procedure");
                Ok(Value::Atom(name))
            }
            _ => Err(LispError::InvalidSpecialForm(
                "define: expected a name or (name . params)".into(),
            )),
        }
    }

    /// (set! name expr)
    fn eval_set(&mut self, rest: Value, env: FrameId) -> LispResult<Value> {
        let operands = self.operands("set!", rest)?;
        let name = match operands.as_slice() {
            [Value::Atom(name), _] if !self.is_self_evaluating(*name) => *name,
            _ => {
                return Err(LispError::InvalidSpecialForm(
                    "set!: expected (set! name expr)".into(),
                ))
            }
        };
        let value = self.eval_in(operands[1], env)?;
        self.frames
            .mutate(name, value, env, &mut self.heap, &self.atoms)?;
        Ok(Value::Nil)
    }

    /// (quote x)
    fn eval_quote(&mut self, rest: Value) -> LispResult<Value> {
        match self.operands("quote", rest)?.as_slice() {
            [datum] => Ok(*datum),
            _ => Err(LispError::InvalidSpecialForm(
                "quote: expected exactly one operand".into(),
            )),
        }
    }

    /// (if test consequent [alternative])
    fn eval_if(&mut self, rest: Value, env: FrameId) -> LispResult<Value> {
        let operands = self.operands("if", rest)?;
        if operands.len() != 2 && operands.len() != 3 {
            return Err(LispError::InvalidSpecialForm(
                "if: expected (if test consequent [alternative])".into(),
            ));
        }
        let test = self.eval_in(operands[0], env)?;
        match test {
            Value::Atom(sym::TRUE) => self.eval_in(operands[1], env),
            Value::Atom(sym::FALSE) => match operands.get(2) {
                Some(&alternative) => self.eval_in(alternative, env),
                None => Ok(Value::Nil),
            },
            other => Err(LispError::InvalidCondition(self.print(other))),
        }
    }

    /// (lambda params body...)
    fn eval_lambda(&mut self, rest: Value, env: FrameId) -> LispResult<Value> {
        let id = rest.as_pair().ok_or_else(|| {
            LispError::InvalidSpecialForm("lambda: missing parameter list".into())
        })?;
        let params = self.heap.car(id);
        let body = self.heap.cdr(id);
        self.make_closure(params, body, env)
    }

    /// Build `(env . (params . body))` in durable storage and keep `env`
    /// alive for it.
    fn make_closure(&mut self, params: Value, body: Value, env: FrameId) -> LispResult<Value> {
        self.check_params(params)?;
        if !body.is_pair() || self.heap.list_to_vec(body).is_none() {
            return Err(LispError::InvalidSpecialForm(
                "lambda: body must be a non-empty list of forms".into(),
            ));
        }
        let params = self.heap.deep_copy(params)?;
        let body = self.heap.deep_copy(body)?;
        let code = self.heap.alloc(params, body)?;
        let closure = self.heap.alloc(Value::Env(env), Value::Pair(code))?;
        self.frames.keep(env)?;
        trace!(frame = ?env, "closure");
        Ok(Value::Pair(closure))
    }

    /// A parameter list is `()`, a symbol, or a (possibly dotted) list of
    /// symbols. Numbers and booleans can't be parameters.
    fn check_params(&self, params: Value) -> LispResult<()> {
        let is_symbol = |v: Value| matches!(v, Value::Atom(id) if !self.is_self_evaluating(id));
        let mut current = params;
        loop {
            match current {
                Value::Nil => return Ok(()),
                v if is_symbol(v) => return Ok(()),
                Value::Pair(id) if is_symbol(self.heap.car(id)) => {
                    current = self.heap.cdr(id);
                }
                _ => {
                    return Err(LispError::InvalidSpecialForm(
                        "lambda: parameters must be symbols".into(),
                    ))
                }
            }
        }
    }

    // ========================================================================
    // Application
    // ========================================================================

    /// Apply `procedure` to the unevaluated operands `arg_exprs`, evaluating
    /// them left to right in `caller`.
    ///
    /// The procedure and each evaluated argument stay on the root stack until
    /// the call returns, so a frame collection during the call sees them.
    pub fn apply(&mut self, procedure: Value, arg_exprs: Value, caller: FrameId) -> LispResult<Value> {
        let base = self.roots.len();
        self.roots.push(procedure);
        let result = self.apply_rooted(procedure, arg_exprs, caller);
        self.roots.truncate(base);
        result
    }

    fn apply_rooted(&mut self, procedure: Value, arg_exprs: Value, caller: FrameId) -> LispResult<Value> {
        let exprs = self.heap.list_to_vec(arg_exprs).ok_or_else(|| {
            LispError::InvalidSpecialForm("application: improper argument list".into())
        })?;

        match procedure {
            Value::Prim(prim) => {
                if let Some(n) = prim.arity() {
                    if exprs.len() != n {
                        return Err(LispError::arity(prim.name(), n, exprs.len()));
                    }
                }
                let args = self.eval_args(&exprs, caller)?;
                trace!(primitive = prim.name(), argc = args.len(), "apply");
                self.apply_primitive(prim, &args)
            }
            Value::Pair(id) if self.heap.is_closure(procedure) => {
                let args = self.eval_args(&exprs, caller)?;
                self.apply_closure(id, &args)
            }
            other => Err(LispError::TypeMismatch(format!(
                "cannot apply {}",
                self.print(other)
            ))),
        }
    }

    fn eval_args(&mut self, exprs: &[Value], caller: FrameId) -> LispResult<Vec<Value>> {
        let mut args = Vec::with_capacity(exprs.len());
        for &expr in exprs {
            let arg = self.eval_in(expr, caller)?;
            self.roots.push(arg);
            args.push(arg);
        }
        Ok(args)
    }

    pub fn apply_primitive(&mut self, prim: Primitive, args: &[Value]) -> LispResult<Value> {
        primitives::call_primitive(prim, args, &mut self.heap, &mut self.atoms)
    }

    /// Call a closure on evaluated arguments.
    ///
    /// The call frame is retracted on every exit, unless the result is a
    /// closure that captured it.
    fn apply_closure(&mut self, closure: PairId, args: &[Value]) -> LispResult<Value> {
        let captured = self.heap.car(closure).as_env().ok_or_else(|| {
            LispError::Internal("closure without an environment".into())
        })?;
        let code = self.heap.cdr(closure).as_pair().ok_or_else(|| {
            LispError::Internal("closure without code".into())
        })?;
        let params = self.heap.car(code);
        let body = self.heap.cdr(code);

        let frame = match self.frames.extend(captured) {
            Err(LispError::EnvironmentPoolExhausted { .. }) => {
                self.collect_frames();
                self.frames.extend(captured)?
            }
            other => other?,
        };
        trace!(frame = ?frame, argc = args.len(), "apply closure");

        let result = self
            .bind_params(params, args, frame)
            .and_then(|()| self.eval_body(body, frame));

        let escaped = match result {
            Ok(val) => self.captures(val, frame),
            Err(_) => false,
        };
        if !escaped {
            self.frames.retract(frame)?;
        }
        result
    }

    /// Free every frame that no binding, evaluation in progress or pending
    /// argument can reach. Runs on its own when the pool runs out.
    pub fn collect_frames(&mut self) -> usize {
        let mut roots: Vec<Value> = self.scopes.iter().map(|&f| Value::Env(f)).collect();
        roots.extend_from_slice(&self.roots);
        self.frames.collect(&roots, &self.heap)
    }

    fn captures(&self, val: Value, frame: FrameId) -> bool {
        match val {
            Value::Pair(id) if self.heap.is_closure(val) => self.heap.car(id) == Value::Env(frame),
            _ => false,
        }
    }

    /// Bind parameters positionally. A trailing atom takes the remaining
    /// arguments as a list.
    fn bind_params(&mut self, params: Value, args: &[Value], frame: FrameId) -> LispResult<()> {
        let (required, rest) = self.param_shape(params);
        if args.len() < required || (rest.is_none() && args.len() > required) {
            return Err(if rest.is_some() {
                LispError::arity_at_least("lambda", required, args.len())
            } else {
                LispError::arity("lambda", required, args.len())
            });
        }

        let mut current = params;
        let mut i = 0;
        while let Value::Pair(id) = current {
            if let Value::Atom(name) = self.heap.car(id) {
                self.frames
                    .bind(frame, name, args[i], &mut self.heap, &self.atoms)?;
            }
            i += 1;
            current = self.heap.cdr(id);
        }
        if let Some(name) = rest {
            let mut extra = Vec::with_capacity(args.len() - i);
            for &arg in &args[i..] {
                extra.push(self.heap.deep_copy(arg)?);
            }
            let list = self.heap.list(&extra)?;
            self.frames
                .bind(frame, name, list, &mut self.heap, &self.atoms)?;
        }
        Ok(())
    }

    /// Number of positional parameters, and the rest parameter if any.
    fn param_shape(&self, params: Value) -> (usize, Option<AtomId>) {
        let mut count = 0;
        let mut current = params;
        loop {
            match current {
                Value::Pair(id) => {
                    count += 1;
                    current = self.heap.cdr(id);
                }
                Value::Atom(name) => return (count, Some(name)),
                _ => return (count, None),
            }
        }
    }

    /// Evaluate body forms in order, returning the last value.
    fn eval_body(&mut self, body: Value, env: FrameId) -> LispResult<Value> {
        let mut result = Value::Nil;
        let mut current = body;
        while let Value::Pair(id) = current {
            let form = self.heap.car(id);
            result = self.eval_in(form, env)?;
            current = self.heap.cdr(id);
        }
        Ok(result)
    }
}

#[derive(Clone, Copy)]
enum Form {
    Define,
    Set,
    Quote,
    If,
    Lambda,
}
