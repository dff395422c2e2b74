//! VM call frames.

use std::rc::Rc;

use monkey_core::Closure;

/// One active call: the closure being executed, its instruction pointer,
/// and the stack index its locals/parameters begin at.
#[derive(Debug)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub bp: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, bp: usize) -> Self {
        Frame { closure, ip: 0, bp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monkey_core::{CompiledFunction, Instructions};

    #[test]
    fn frame_starts_at_instruction_zero() {
        let func = Rc::new(CompiledFunction {
            instructions: Instructions::new(),
            num_locals: 0,
            num_args: 0,
        });
        let closure = Rc::new(Closure { func, free: vec![] });
        let frame = Frame::new(closure, 3);
        assert_eq!(frame.ip, 0);
        assert_eq!(frame.bp, 3);
    }
}
