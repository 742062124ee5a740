use crate::{object::Heap, value::Value};

use super::RuntimeError;

pub const MAX_STACK_SIZE: usize = 256;

pub struct Stack {
    storage: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Stack {
            storage: Vec::with_capacity(MAX_STACK_SIZE),
        }
    }

    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.storage.len() >= MAX_STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.storage.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Value {
        self.storage
            .pop()
            .expect("VM shouldn't underflow the Stack")
    }

    pub fn peek(&self, distance: usize) -> Value {
        self.storage[self.storage.len() - 1 - distance]
    }

    pub fn reset(&mut self) {
        self.storage.clear();
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Renders the stack slots, bottom first, for execution tracing.
    #[cfg_attr(not(feature = "trace"), allow(dead_code))]
    pub fn render(&self, heap: &Heap) -> String {
        let mut out = String::from("          ");
        for value in self.storage.iter() {
            out.push_str(&format!("[ {} ]", value.display(heap)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_peek() {
        let mut stack = Stack::new();
        stack.push(Value::Number(1.0)).unwrap();
        stack.push(Value::Nil).unwrap();
        assert_eq!(stack.peek(0), Value::Nil);
        assert_eq!(stack.peek(1), Value::Number(1.0));
        assert_eq!(stack.pop(), Value::Nil);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut stack = Stack::new();
        for _ in 0..MAX_STACK_SIZE {
            stack.push(Value::Nil).unwrap();
        }
        assert!(matches!(
            stack.push(Value::Nil),
            Err(RuntimeError::StackOverflow)
        ));
        stack.reset();
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn test_render() {
        let heap = Heap::new();
        let mut stack = Stack::new();
        stack.push(Value::Number(1.5)).unwrap();
        stack.push(Value::Boolean(true)).unwrap();
        assert_eq!(stack.render(&heap), "          [ 1.5 ][ true ]");
    }
}
