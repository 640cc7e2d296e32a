//! Protocols: a named set of roles plus protocol-local constants.

use crate::role::Role;
use doyac_base::Symbol;
use doyac_term::Term;

#[derive(Clone, Debug)]
pub struct Protocol {
    pub name: Symbol,
    pub role_names: Vec<Symbol>,
    pub roles: Vec<Role>,
    pub constants: Vec<Term>,
}

impl Protocol {
    pub fn new(name: Symbol) -> Self {
        Protocol {
            name,
            role_names: Vec::new(),
            roles: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn add_role(&mut self, role: Role) {
        self.role_names.push(role.name);
        self.roles.push(role);
    }

    pub fn role(&self, name: Symbol) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }
}
